//! JSON-lines transport: one [`Request`] per input line, one [`Response`] per
//! output line.

use anyhow::Context as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio::sync::mpsc;

use crate::app::message::{Request, Response, channel};
use crate::app::router::RequestRouter;

/// Serves `router` until `input` reaches EOF and every started search has
/// been answered on `output`.
pub async fn serve<R, W>(
    router: RequestRouter,
    responses: mpsc::Receiver<Response>,
    input: R,
    output: W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (requests_tx, requests_rx) = channel();
    let reader = tokio::spawn(read_requests(input, requests_tx));
    let writer = tokio::spawn(write_responses(responses, output));

    let served = router.serve(requests_rx).await;
    if served.is_err() {
        // Input may never reach EOF once the router is gone.
        reader.abort();
    }
    let read = match reader.await {
        Ok(read) => read,
        Err(err) if err.is_cancelled() => Ok(()),
        Err(err) => return Err(err).context("join request reader"),
    };
    let written = writer.await.context("join response writer")?;

    served?;
    read?;
    written
}

async fn read_requests<R>(input: R, requests: mpsc::Sender<Request>) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("read request line")? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let request = match serde_json::from_str::<Request>(line) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(line_no, %err, "skip malformed request");
                continue;
            }
        };
        tracing::debug!(line_no, ?request, "request");
        if requests.send(request).await.is_err() {
            // The router stopped; its error is reported by `serve`.
            break;
        }
    }
    Ok(())
}

async fn write_responses<W>(mut responses: mpsc::Receiver<Response>, mut output: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = responses.recv().await {
        let mut line = serde_json::to_string(&response).context("serialize response")?;
        line.push('\n');
        output
            .write_all(line.as_bytes())
            .await
            .context("write response")?;
        output.flush().await.context("flush response")?;
    }
    Ok(())
}
