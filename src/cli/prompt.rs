//! Interactive challenge resolution on the controlling terminal.

use std::io::{self, BufRead, BufReader};
use std::thread;

use async_trait::async_trait;
use tokio::sync::oneshot;

use bookscout::crawl::ChallengeResolver;

use super::icons::{dim_arrow, warn};
use super::progress::CrawlProgress;

/// Read one line from `reader` on a plain OS thread. Dropping the receiver
/// abandons the read; the thread never holds up runtime shutdown.
fn read_line_detached<R>(mut reader: R) -> io::Result<oneshot::Receiver<io::Result<usize>>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    thread::Builder::new()
        .name("operator-input".to_string())
        .spawn(move || {
            let mut line = String::new();
            let _ = tx.send(reader.read_line(&mut line));
        })?;
    Ok(rx)
}

/// Asks the operator to solve the challenge in the visible browser window
/// and waits for Enter.
pub struct TerminalResolver {
    progress: CrawlProgress,
}

impl TerminalResolver {
    pub fn new(progress: CrawlProgress) -> Self {
        Self { progress }
    }
}

#[async_trait]
impl ChallengeResolver for TerminalResolver {
    async fn resolve(&mut self, category: &str, page: u32, url: &str) {
        self.progress.pause();
        self.progress.println(format!(
            "{} {} page {} is asking for a captcha",
            warn(),
            category,
            page
        ));
        self.progress.println(format!("  {} {}", dim_arrow(), url));
        self.progress.println(format!(
            "  {} Solve it in the browser window, then press Enter",
            dim_arrow()
        ));

        match read_line_detached(BufReader::new(io::stdin())) {
            Ok(input) => match input.await {
                Ok(Ok(0)) => tracing::warn!("stdin closed while waiting for the operator"),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!("Could not read from stdin: {}", e),
                Err(_) => tracing::warn!("Input thread ended without a reply"),
            },
            Err(e) => tracing::warn!("Could not start the input thread: {}", e),
        }
        self.progress.resume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::time::Duration;

    /// A reader that never returns, like a terminal nobody types into.
    struct Silent;

    impl Read for Silent {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            loop {
                thread::park();
            }
        }
    }

    #[tokio::test]
    async fn line_is_delivered() {
        let input = read_line_detached(Cursor::new(b"\n".to_vec())).unwrap();
        assert_eq!(input.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn abandoned_read_does_not_hold_the_runtime() {
        let input = read_line_detached(BufReader::new(Silent)).unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(50), input)
            .await
            .is_err());
        // Returning here drops the runtime while the read is still pending.
    }
}
