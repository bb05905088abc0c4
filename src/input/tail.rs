use super::InputError;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const READ_BUF_SIZE: usize = 64 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Where the agent reads lines from.
#[derive(Debug, Clone)]
pub enum InputSource {
    /// Follow a file from its current end, like `tail -f`.
    File(PathBuf),
    /// Consume standard input until EOF.
    Stdin,
}

/// Spawns the reader task for `source`, returning the line channel and the
/// task handle. The channel is bounded; a stalled consumer backpressures the
/// reader instead of growing memory. The channel closing (reader returned or
/// failed) is the consumer's end-of-input signal.
pub fn spawn_reader(
    source: InputSource,
    channel_capacity: usize,
) -> (mpsc::Receiver<String>, JoinHandle<Result<(), InputError>>) {
    let (tx, rx) = mpsc::channel(channel_capacity);
    let handle = tokio::spawn(async move {
        match source {
            InputSource::File(path) => tail_file(path, tx).await,
            InputSource::Stdin => read_stream(tokio::io::stdin(), tx).await,
        }
    });
    (rx, handle)
}

async fn tail_file(path: PathBuf, tx: mpsc::Sender<String>) -> Result<(), InputError> {
    let mut file = File::open(&path).await.map_err(|source| InputError::Open {
        path: path.display().to_string(),
        source,
    })?;
    // Start at the current end; history before agent start is not forwarded.
    let mut pos = file.seek(SeekFrom::End(0)).await?;
    info!(path = %path.display(), offset = pos, "tailing file");

    let mut carry = Vec::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        if tx.is_closed() {
            debug!("line consumer gone, stopping file reader");
            return Ok(());
        }

        // copytruncate-style rotation: the file shrank under us.
        let len = file.metadata().await?.len();
        if len < pos {
            warn!(path = %path.display(), "file truncated, restarting from top");
            file.seek(SeekFrom::Start(0)).await?;
            pos = 0;
            carry.clear();
        }

        let n = file.read(&mut buf).await?;
        if n == 0 {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        }
        pos += n as u64;

        for line in split_lines(&mut carry, &buf[..n]) {
            if tx.send(line).await.is_err() {
                return Ok(());
            }
        }
    }
}

async fn read_stream<R>(mut reader: R, tx: mpsc::Sender<String>) -> Result<(), InputError>
where
    R: AsyncRead + Unpin,
{
    let mut carry = Vec::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            // EOF: the trailing partial line can never complete, forward it
            // rather than lose it.
            if !carry.is_empty() {
                let _ = tx.send(String::from_utf8_lossy(&carry).into_owned()).await;
            }
            info!("input stream reached EOF");
            return Ok(());
        }
        for line in split_lines(&mut carry, &buf[..n]) {
            if tx.send(line).await.is_err() {
                return Ok(());
            }
        }
    }
}

/// Splits `chunk` into complete lines, holding any trailing partial line in
/// `carry` until its terminator arrives. Strips `\n` and a preceding `\r`.
fn split_lines(carry: &mut Vec<u8>, chunk: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    for byte in chunk {
        if *byte == b'\n' {
            if carry.last() == Some(&b'\r') {
                carry.pop();
            }
            lines.push(String::from_utf8_lossy(carry).into_owned());
            carry.clear();
        } else {
            carry.push(*byte);
        }
    }
    lines
}
