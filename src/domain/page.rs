use serde::{Deserialize, Serialize};

/// Opaque position in a listing. Backends decide what it encodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuery {
    pub page_size: usize,
    pub cursor: Option<Cursor>,
}

impl PageQuery {
    pub fn first(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            cursor: None,
        }
    }

    pub fn after(page_size: usize, cursor: Cursor) -> Self {
        Self {
            page_size: page_size.max(1),
            cursor: Some(cursor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub next: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}
