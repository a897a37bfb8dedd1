//! Logical references to collections and documents.
//!
//! A [`Reference`] names a target in the store; it holds no connection and
//! no state. Equality is structural, which is what the
//! [`Stabilizer`](crate::Stabilizer) and the subscriptions compare when
//! deciding whether a target changed.
//!
//! Paths alternate collection and document segments:
//!
//! ```text
//! personnel              collection (1 segment)
//! personnel/p1           document   (2 segments)
//! users/abc/notes        collection (3 segments)
//! ```

use std::fmt;

/// Errors constructing a reference from a path.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("empty path")]
    Empty,
    #[error("path '{0}' has an empty segment")]
    EmptySegment(String),
    #[error("'{path}' is not a {expected} path")]
    WrongKind { path: String, expected: &'static str },
}

/// A collection or a single document in the store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reference {
    Collection { path: String },
    Document { collection: String, id: String },
}

fn segments(path: &str) -> Result<Vec<&str>, ReferenceError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(ReferenceError::Empty);
    }
    let segs: Vec<&str> = trimmed.split('/').collect();
    if segs.iter().any(|s| s.trim().is_empty()) {
        return Err(ReferenceError::EmptySegment(path.to_string()));
    }
    Ok(segs)
}

impl Reference {
    /// A collection path (odd number of segments).
    pub fn collection(path: &str) -> Result<Self, ReferenceError> {
        let segs = segments(path)?;
        if segs.len() % 2 == 0 {
            return Err(ReferenceError::WrongKind {
                path: path.to_string(),
                expected: "collection",
            });
        }
        Ok(Reference::Collection { path: segs.join("/") })
    }

    /// A document path (even number of segments).
    pub fn document(path: &str) -> Result<Self, ReferenceError> {
        let mut segs = segments(path)?;
        if segs.len() % 2 == 1 {
            return Err(ReferenceError::WrongKind {
                path: path.to_string(),
                expected: "document",
            });
        }
        let id = segs.pop().unwrap_or_default().to_string();
        Ok(Reference::Document {
            collection: segs.join("/"),
            id,
        })
    }

    /// Document `id` inside this collection.
    pub fn doc(&self, id: &str) -> Result<Self, ReferenceError> {
        match self {
            Reference::Collection { path } => {
                if id.trim().is_empty() || id.contains('/') {
                    return Err(ReferenceError::EmptySegment(format!("{path}/{id}")));
                }
                Ok(Reference::Document {
                    collection: path.clone(),
                    id: id.to_string(),
                })
            }
            Reference::Document { collection, id: own } => Err(ReferenceError::WrongKind {
                path: format!("{collection}/{own}"),
                expected: "collection",
            }),
        }
    }

    /// Full slash-separated path.
    pub fn path(&self) -> String {
        match self {
            Reference::Collection { path } => path.clone(),
            Reference::Document { collection, id } => format!("{collection}/{id}"),
        }
    }

    /// Path of the collection this reference is, or lives in.
    pub fn collection_path(&self) -> &str {
        match self {
            Reference::Collection { path } => path,
            Reference::Document { collection, .. } => collection,
        }
    }

    /// Last segment of [`collection_path`](Self::collection_path): the name
    /// that determines the record shape.
    pub fn collection_id(&self) -> &str {
        let path = self.collection_path();
        path.rsplit('/').next().unwrap_or(path)
    }

    /// Document id, for document references.
    pub fn id(&self) -> Option<&str> {
        match self {
            Reference::Collection { .. } => None,
            Reference::Document { id, .. } => Some(id),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Reference::Collection { .. })
    }

    pub fn is_document(&self) -> bool {
        matches!(self, Reference::Document { .. })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
