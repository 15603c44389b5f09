//! Firmware upload body handling for the HTTP update endpoint.
//!
//! Browsers post the image as a `multipart/form-data` form; scripted
//! uploads (`curl --data-binary`) send it raw. [`UploadBody`] turns either
//! into a stream of image bytes without buffering the whole file:
//!
//! ```text
//!   --B\r\n headers \r\n\r\n  <image bytes>  \r\n--B--\r\n
//!   ^^^^^^^^ skipped ^^^^^^^                ^^ stops here
//! ```
//!
//! Only the first part is written; anything after its closing delimiter is
//! ignored.

use crate::error::UploadError;

/// Part headers larger than this are rejected.
const MAX_PART_HEADER: usize = 1024;

#[derive(Debug)]
pub enum UploadBody {
    Raw { written: usize },
    Multipart(MultipartExtractor),
}

impl UploadBody {
    /// Pick the body handling from the request's `Content-Type`.
    pub fn for_content_type(content_type: Option<&str>) -> Result<Self, UploadError> {
        let Some(ct) = content_type else {
            return Ok(Self::Raw { written: 0 });
        };
        let mut params = ct.split(';').map(str::trim);
        let mime = params.next().unwrap_or_default();
        if !mime.eq_ignore_ascii_case("multipart/form-data") {
            return Ok(Self::Raw { written: 0 });
        }

        let boundary = params
            .filter_map(|p| p.split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
            .map(|(_, v)| v.trim().trim_matches('"'))
            .filter(|b| !b.is_empty())
            .ok_or(UploadError::MissingBoundary)?;
        Ok(Self::Multipart(MultipartExtractor::new(boundary)))
    }

    /// Pass one received chunk through, writing image bytes to `sink`.
    pub fn feed<F>(&mut self, chunk: &[u8], sink: &mut F) -> Result<(), UploadError>
    where
        F: FnMut(&[u8]) -> Result<(), UploadError>,
    {
        match self {
            Self::Raw { written } => {
                sink(chunk)?;
                *written += chunk.len();
                Ok(())
            }
            Self::Multipart(m) => m.feed(chunk, sink),
        }
    }

    /// Image bytes handed to the sink once the request body has ended.
    pub fn finish(&self) -> Result<usize, UploadError> {
        match self {
            Self::Raw { written: 0 } => Err(UploadError::Empty),
            Self::Raw { written } => Ok(*written),
            Self::Multipart(m) => m.finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartState {
    Headers,
    Body,
    Done,
}

/// Streaming extractor for the first part of a multipart body.
#[derive(Debug)]
pub struct MultipartExtractor {
    /// `--boundary`, which opens the first part.
    opening: Vec<u8>,
    /// `\r\n--boundary`, which closes a part body.
    closing: Vec<u8>,
    pending: Vec<u8>,
    state: PartState,
    written: usize,
}

impl MultipartExtractor {
    pub fn new(boundary: &str) -> Self {
        let mut opening = b"--".to_vec();
        opening.extend_from_slice(boundary.as_bytes());
        let mut closing = b"\r\n".to_vec();
        closing.extend_from_slice(&opening);
        Self {
            opening,
            closing,
            pending: Vec::new(),
            state: PartState::Headers,
            written: 0,
        }
    }

    pub fn feed<F>(&mut self, chunk: &[u8], sink: &mut F) -> Result<(), UploadError>
    where
        F: FnMut(&[u8]) -> Result<(), UploadError>,
    {
        if self.state == PartState::Done {
            return Ok(());
        }
        self.pending.extend_from_slice(chunk);

        if self.state == PartState::Headers {
            let Some(end) = find(&self.pending, b"\r\n\r\n") else {
                if self.pending.len() > MAX_PART_HEADER {
                    return Err(UploadError::MalformedMultipart);
                }
                return Ok(());
            };
            if find(&self.pending[..end], &self.opening).is_none() {
                return Err(UploadError::MalformedMultipart);
            }
            self.pending.drain(..end + 4);
            self.state = PartState::Body;
        }

        if let Some(end) = find(&self.pending, &self.closing) {
            self.emit(end, sink)?;
            self.pending.clear();
            self.state = PartState::Done;
            return Ok(());
        }

        // Hold back enough bytes to recognise a delimiter split across chunks.
        let keep = self.closing.len() - 1;
        if self.pending.len() > keep {
            let n = self.pending.len() - keep;
            self.emit(n, sink)?;
            self.pending.drain(..n);
        }
        Ok(())
    }

    fn emit<F>(&mut self, n: usize, sink: &mut F) -> Result<(), UploadError>
    where
        F: FnMut(&[u8]) -> Result<(), UploadError>,
    {
        if n > 0 {
            sink(&self.pending[..n])?;
            self.written += n;
        }
        Ok(())
    }

    pub fn finish(&self) -> Result<usize, UploadError> {
        match self.state {
            PartState::Done if self.written > 0 => Ok(self.written),
            PartState::Done => Err(UploadError::Empty),
            _ => Err(UploadError::Incomplete),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
