//! Scan sessions

use crate::config::ApiConfig;
use crate::driver::SessionHandle;
use crate::logging::LogLevel;
use crate::page::PageReader;
use crate::value::ImageFormat;
use crate::{Error, ErrorCode, Result};
use std::fmt::{self, Display};
use std::marker::PhantomData;
use std::rc::Rc;

/// Parameters agreed with the device for the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParameters {
    /// Guaranteed to be accurate while scanning.
    pub format: ImageFormat,
    /// Width in pixels. Guaranteed to be accurate while scanning.
    pub width: u32,
    /// Height in pixels. *Not* guaranteed to be accurate while scanning.
    pub height: u32,
    /// Estimated image size in bytes, usable to pre-allocate memory.
    pub image_size: usize,
}

impl Display for ScanParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WxH: {}x{}\nSize: {} bytes\nFormat: {} ({})\n",
            self.width,
            self.height,
            self.image_size,
            self.format.as_raw(),
            self.format
        )
    }
}

/// A running scan, started with [`Item::scan_start`](crate::Item::scan_start).
///
/// Pages are pulled with [`scan_read`](Self::scan_read) (or through a
/// [`PageReader`]) until [`end_of_page`](Self::end_of_page); more pages
/// follow until [`end_of_feed`](Self::end_of_feed). Dropping a session
/// releases nothing in the library; [`cancel`](Self::cancel) aborts it.
pub struct ScanSession<'item> {
    handle: Box<dyn SessionHandle>,
    config: Rc<ApiConfig>,
    _item: PhantomData<&'item ()>,
}

impl<'item> ScanSession<'item> {
    pub(crate) fn new(handle: Box<dyn SessionHandle>, config: Rc<ApiConfig>) -> Self {
        ScanSession {
            handle,
            config,
            _item: PhantomData,
        }
    }

    pub fn get_scan_parameters(&mut self) -> Result<ScanParameters> {
        self.handle
            .get_scan_parameters()
            .map_err(|code| Error::lis(code, "get_scan_parameters"))
    }

    /// True once the current page has been fully delivered.
    pub fn end_of_page(&mut self) -> bool {
        self.handle.end_of_page()
    }

    /// True once no page remains.
    pub fn end_of_feed(&mut self) -> bool {
        self.handle.end_of_feed()
    }

    /// Read the next chunk of image data, returning the number of bytes
    /// written into `buf`.
    ///
    /// While the device reports that it is warming up, the read is retried
    /// after the interval of the configured [`RetryPolicy`], blocking the
    /// calling thread. With an unbounded policy this waits as long as the
    /// device needs.
    ///
    /// [`RetryPolicy`]: crate::RetryPolicy
    pub fn scan_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let policy = self.config.retry_policy();
        let mut attempts = 0u32;
        loop {
            match self.handle.scan_read(buf) {
                Ok(n) => return Ok(n),
                Err(ErrorCode::WarmingUp) if policy.allows(attempts) => {
                    attempts += 1;
                    self.config.sink().log(
                        LogLevel::Warning,
                        &format!(
                            "Warming the lamp up... waiting for {} ms...",
                            policy.interval.as_millis()
                        ),
                    );
                    self.config.sleeper_ref().sleep(policy.interval);
                }
                Err(code) => return Err(Error::lis(code, "scan_read")),
            }
        }
    }

    /// Stream the current page.
    pub fn page_reader(&mut self) -> Result<PageReader<'_, 'item>> {
        let params = self.get_scan_parameters()?;
        Ok(PageReader::new(self, params))
    }

    pub(crate) fn buffer_size(&self) -> usize {
        self.config.buffer_size()
    }

    /// Abort the scan.
    pub fn cancel(mut self) {
        self.config.sink().log(LogLevel::Debug, "cancelling scan session");
        self.handle.cancel();
    }
}

impl fmt::Debug for ScanSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSession")
            .field("retry", &self.config.retry_policy())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{RecordingSink, RecordingSleeper};
    use std::sync::Arc;
    use std::time::Duration;

    struct Scripted {
        replies: Vec<std::result::Result<usize, ErrorCode>>,
        calls: usize,
    }

    impl SessionHandle for Scripted {
        fn get_scan_parameters(&mut self) -> crate::driver::DriverResult<ScanParameters> {
            Err(ErrorCode::Unsupported)
        }
        fn end_of_feed(&mut self) -> bool {
            true
        }
        fn end_of_page(&mut self) -> bool {
            true
        }
        fn scan_read(&mut self, buf: &mut [u8]) -> crate::driver::DriverResult<usize> {
            let reply = self.replies[self.calls.min(self.replies.len() - 1)];
            self.calls += 1;
            if let Ok(n) = reply {
                buf[..n].fill(0xAB);
            }
            reply
        }
        fn cancel(&mut self) {}
    }

    fn session(
        replies: Vec<std::result::Result<usize, ErrorCode>>,
        policy: crate::RetryPolicy,
    ) -> (ScanSession<'static>, Arc<RecordingSink>, Arc<RecordingSleeper>) {
        let sink = Arc::new(RecordingSink::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let config = ApiConfig::new()
            .retry(policy)
            .log_sink(sink.clone())
            .sleeper(sleeper.clone());
        let handle = Box::new(Scripted { replies, calls: 0 });
        (ScanSession::new(handle, Rc::new(config)), sink, sleeper)
    }

    #[test]
    fn test_warm_up_is_retried_until_data_arrives() {
        let replies = vec![
            Err(ErrorCode::WarmingUp),
            Err(ErrorCode::WarmingUp),
            Err(ErrorCode::WarmingUp),
            Ok(4),
        ];
        let (mut s, sink, sleeper) = session(replies, crate::RetryPolicy::default());
        let mut buf = [0u8; 8];

        assert_eq!(s.scan_read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[0xAB; 4]);
        assert_eq!(sleeper.calls(), 3);
        assert!(sleeper.durations().iter().all(|d| *d == Duration::from_secs(1)));
        assert_eq!(sink.count(LogLevel::Warning), 3);
    }

    #[test]
    fn test_real_errors_are_not_retried() {
        let replies = vec![Err(ErrorCode::Jammed), Ok(1)];
        let (mut s, _sink, sleeper) = session(replies, crate::RetryPolicy::default());
        let err = s.scan_read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Jammed));
        assert!(err.to_string().contains("'scan_read'"));
        assert_eq!(sleeper.calls(), 0);
    }

    #[test]
    fn test_bounded_policy_gives_up() {
        let policy = crate::RetryPolicy::new(Duration::from_millis(5)).max_retries(2);
        let (mut s, _sink, sleeper) = session(vec![Err(ErrorCode::WarmingUp)], policy);
        let err = s.scan_read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::WarmingUp));
        assert_eq!(sleeper.calls(), 2);
    }

    #[test]
    fn test_parameters_error_names_operation() {
        let (mut s, _sink, _sleeper) = session(vec![Ok(0)], crate::RetryPolicy::default());
        let err = s.get_scan_parameters().unwrap_err();
        assert!(err.to_string().contains("'get_scan_parameters'"));
    }

    #[test]
    fn test_session_debug_output() {
        let (s, _sink, _sleeper) = session(vec![Ok(0)], crate::RetryPolicy::default());
        let text = format!("{s:?}");
        assert!(text.starts_with("ScanSession {"));
        assert!(text.contains("max_retries: None"));
    }

    #[test]
    fn test_parameters_display() {
        let params = ScanParameters {
            format: ImageFormat::Bmp,
            width: 10,
            height: 20,
            image_size: 654,
        };
        assert_eq!(
            params.to_string(),
            "WxH: 10x20\nSize: 654 bytes\nFormat: 3 (BMP)\n"
        );
    }
}
