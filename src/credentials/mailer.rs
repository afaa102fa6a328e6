//! Outbound password-reset mail.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a reset link to `to`.
    async fn send_password_reset(&self, to: &str, reset_url: &str) -> Result<()>;
}

/// Stand-in used when no mail relay is wired in.
///
/// Only the recipient is logged at `info`. The link carries a live reset
/// token, so it is written at `debug` and nowhere else.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, to: &str, reset_url: &str) -> Result<()> {
        info!(recipient = to, "Password reset requested");
        debug!(
            recipient = to,
            "Password reset link (grants a password change until it expires): {reset_url}"
        );
        Ok(())
    }
}

/// Build the frontend reset link for `token`.
#[must_use]
pub fn reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password/{token}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::{
        io,
        sync::{Arc, Mutex},
    };
    use tracing::Level;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = CapturedWriter;

        fn make_writer(&'a self) -> Self::Writer {
            CapturedWriter(Arc::clone(&self.0))
        }
    }

    impl io::Write for CapturedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut guard = self
                .0
                .lock()
                .map_err(|_| io::Error::other("lock poisoned"))?;
            guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    async fn logged_at(level: Level) -> String {
        let sink = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(sink.clone())
            .with_max_level(level)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);
        LogMailer
            .send_password_reset(
                "ada@example.com",
                "https://example.com/reset-password/live-token-123",
            )
            .await
            .unwrap();
        String::from_utf8(sink.0.lock().unwrap().clone()).unwrap()
    }

    #[tokio::test]
    async fn reset_token_stays_out_of_info_logs() {
        let info = logged_at(Level::INFO).await;
        assert!(info.contains("ada@example.com"));
        assert!(!info.contains("live-token-123"));

        let debug = logged_at(Level::DEBUG).await;
        assert!(debug.contains("live-token-123"));
    }

    #[test]
    fn reset_url_trims_trailing_slash() {
        assert_eq!(
            reset_url("https://example.com/", "abc"),
            "https://example.com/reset-password/abc"
        );
        assert_eq!(
            reset_url("https://example.com", "abc"),
            "https://example.com/reset-password/abc"
        );
    }
}
