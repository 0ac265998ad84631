use serde::{Deserialize, Serialize};

/// One page of query results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialList<T> {
    pub list: Vec<T>,
    pub offset: usize,
    pub page_size: usize,
    /// Matches across the whole query, independent of `offset`/`page_size`.
    pub total_size: u64,
}

impl<T> PartialList<T> {
    pub fn new(list: Vec<T>, offset: usize, page_size: usize, total_size: u64) -> Self {
        Self {
            list,
            offset,
            page_size,
            total_size,
        }
    }

    pub fn empty(offset: usize, page_size: usize) -> Self {
        Self::new(Vec::new(), offset, page_size, 0)
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// True when more matches exist past this page.
    pub fn has_more(&self) -> bool {
        ((self.offset + self.list.len()) as u64) < self.total_size
    }

    /// Convert every entry, keeping the paging metadata. Stops at the first
    /// failed conversion.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> std::result::Result<U, E>) -> std::result::Result<PartialList<U>, E> {
        Ok(PartialList {
            list: self.list.into_iter().map(f).collect::<std::result::Result<_, _>>()?,
            offset: self.offset,
            page_size: self.page_size,
            total_size: self.total_size,
        })
    }
}
