//! Stateless list continuation.
//!
//! A cursor is `base64url("v1:<offset>:<page_size>")`. Nothing is kept on the
//! server, so any process decodes any cursor to the same window.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::ApiError;
use crate::platform::PlatformProfile;

const CURSOR_VERSION: &str = "v1";

/// Why a presented cursor could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
    #[error("page token is not valid base64")]
    Encoding,
    #[error("page token is malformed")]
    Malformed,
    #[error("page token version {0} is not supported")]
    Version(String),
}

impl From<CursorError> for ApiError {
    fn from(err: CursorError) -> Self {
        ApiError::invalid_request(err.to_string())
    }
}

/// Decoded position of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub offset: usize,
    pub page_size: usize,
}

impl Cursor {
    pub fn new(offset: usize, page_size: usize) -> Self {
        Cursor { offset, page_size }
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}:{}:{}", CURSOR_VERSION, self.offset, self.page_size))
    }

    pub fn decode(token: &str) -> Result<Cursor, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim().trim_end_matches('='))
            .map_err(|_| CursorError::Encoding)?;
        let text = String::from_utf8(bytes).map_err(|_| CursorError::Encoding)?;
        let mut parts = text.split(':');
        let (Some(version), Some(offset), Some(size), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CursorError::Malformed);
        };
        if version != CURSOR_VERSION {
            return Err(CursorError::Version(version.to_string()));
        }
        let offset = offset.parse().map_err(|_| CursorError::Malformed)?;
        let page_size = size.parse().map_err(|_| CursorError::Malformed)?;
        Ok(Cursor { offset, page_size })
    }
}

/// A resolved window request, already clamped to the platform's limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub page_size: usize,
}

impl PageRequest {
    /// The first page at the platform's default size.
    pub fn first(profile: &PlatformProfile) -> Self {
        PageRequest { offset: 0, page_size: profile.default_page_size }
    }

    /// Resolves an opaque token. An explicit size wins over the one carried
    /// in the token.
    pub fn from_cursor(
        profile: &PlatformProfile,
        token: Option<&str>,
        page_size: Option<usize>,
    ) -> Result<Self, CursorError> {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => {
                let cursor = Cursor::decode(token)?;
                Ok(Self::clamped(profile, cursor.offset, page_size.or(Some(cursor.page_size))))
            }
            None => Ok(Self::clamped(profile, 0, page_size)),
        }
    }

    /// Zero-based start index plus count, as LinkedIn and The Trade Desk
    /// paginate.
    pub fn from_start_index(profile: &PlatformProfile, start: Option<usize>, count: Option<usize>) -> Self {
        Self::clamped(profile, start.unwrap_or(0), count)
    }

    /// One-based page number, as TikTok paginates. Page 0 is read as page 1.
    pub fn from_page(profile: &PlatformProfile, page: Option<usize>, page_size: Option<usize>) -> Self {
        let size = Self::clamped(profile, 0, page_size).page_size;
        let page = page.unwrap_or(1).max(1);
        PageRequest { offset: (page - 1).saturating_mul(size), page_size: size }
    }

    fn clamped(profile: &PlatformProfile, offset: usize, page_size: Option<usize>) -> Self {
        let page_size = match page_size {
            Some(0) | None => profile.default_page_size,
            Some(size) => size.min(profile.max_page_size),
        };
        PageRequest { offset, page_size }
    }

    /// Caps the page size below the platform maximum, e.g. for a GAQL `LIMIT`.
    pub fn limited(self, limit: Option<usize>) -> Self {
        match limit {
            Some(limit) if limit > 0 && limit < self.page_size => PageRequest { page_size: limit, ..self },
            _ => self,
        }
    }

    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.offset, self.page_size)
    }
}

/// One window of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: usize,
    pub page_size: usize,
    /// Items matching the query across all pages.
    pub total: usize,
    /// Token for the following window, if there is one.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    pub fn next_offset(&self) -> Option<usize> {
        self.has_more().then(|| self.offset + self.page_size)
    }

    /// One-based page number, for platforms that paginate by page.
    pub fn page_number(&self) -> usize {
        self.offset / self.page_size.max(1) + 1
    }

    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.page_size.max(1))
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            offset: self.offset,
            page_size: self.page_size,
            total: self.total,
            next_cursor: self.next_cursor,
        }
    }
}

/// Cuts the requested window out of an already ordered list.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total = items.len();
    let end = request.offset.saturating_add(request.page_size);
    let next_cursor = (end < total).then(|| Cursor::new(end, request.page_size).encode());
    let items = items.into_iter().skip(request.offset).take(request.page_size).collect();
    Page {
        items,
        offset: request.offset,
        page_size: request.page_size,
        total,
        next_cursor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;

    #[test]
    fn cursor_is_opaque_and_stateless() {
        let token = Cursor::new(40, 20).encode();
        assert!(!token.contains("40"));
        assert_eq!(Cursor::decode(&token), Ok(Cursor::new(40, 20)));
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert_eq!(Cursor::decode("***"), Err(CursorError::Encoding));
        let wrong = URL_SAFE_NO_PAD.encode("v1:abc:10");
        assert_eq!(Cursor::decode(&wrong), Err(CursorError::Malformed));
        let future = URL_SAFE_NO_PAD.encode("v9:0:10");
        assert_eq!(Cursor::decode(&future), Err(CursorError::Version("v9".into())));
    }

    #[test]
    fn sizes_clamp_to_platform_limits() {
        let meta = Platform::Meta.profile();
        assert_eq!(PageRequest::from_cursor(meta, None, None).unwrap().page_size, 25);
        assert_eq!(PageRequest::from_cursor(meta, None, Some(5000)).unwrap().page_size, 100);
        let dv360 = Platform::Dv360.profile();
        assert_eq!(PageRequest::from_start_index(dv360, Some(3), Some(0)).page_size, 100);
    }

    #[test]
    fn page_numbers_are_one_based() {
        let tiktok = Platform::TikTok.profile();
        let request = PageRequest::from_page(tiktok, Some(3), Some(10));
        assert_eq!(request.offset, 20);
        let request = PageRequest::from_page(tiktok, Some(0), None);
        assert_eq!(request.offset, 0);
    }

    #[test]
    fn windows_follow_the_cursor_chain() {
        let items: Vec<u32> = (0..7).collect();
        let first = paginate(items.clone(), PageRequest { offset: 0, page_size: 3 });
        assert_eq!(first.items, vec![0, 1, 2]);
        assert_eq!(first.total, 7);

        let profile = Platform::Meta.profile();
        let next = PageRequest::from_cursor(profile, first.next_cursor.as_deref(), None).unwrap();
        let second = paginate(items.clone(), next);
        assert_eq!(second.items, vec![3, 4, 5]);
        assert_eq!(second.page_number(), 2);

        let last = paginate(items, PageRequest::from_cursor(profile, second.next_cursor.as_deref(), None).unwrap());
        assert_eq!(last.items, vec![6]);
        assert!(!last.has_more());
        assert_eq!(last.total_pages(), 3);
    }
}
