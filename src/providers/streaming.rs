use std::pin::Pin;

use futures_util::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use tokio_stream::Stream;

use crate::error::{GatewayError, Result};

/// 流式补全的文本块序列
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// 单条上游数据帧的解析结果
pub enum Delta {
    Text(String),
    Skip,
    Done,
}

// 基于 try_unfold 而非 spawn+channel：消费方丢弃流时 EventSource
// 随状态一起析构，上游 HTTP 请求立即中止，不会残留后台任务
pub fn sse_text_stream<F>(builder: reqwest::RequestBuilder, extract: F) -> Result<ChunkStream>
where
    F: Fn(&str) -> Delta + Send + 'static,
{
    let es = builder
        .eventsource()
        .map_err(|e| GatewayError::Stream(format!("Failed to open eventsource: {}", e)))?;

    let stream = futures_util::stream::try_unfold((es, extract), |(mut es, extract)| async move {
        loop {
            match es.next().await {
                None => return Ok(None),
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(m))) => {
                    if m.data.trim() == "[DONE]" {
                        es.close();
                        return Ok(None);
                    }
                    match extract(&m.data) {
                        Delta::Text(text) if !text.is_empty() => {
                            return Ok(Some((text, (es, extract))));
                        }
                        Delta::Done => {
                            es.close();
                            return Ok(None);
                        }
                        _ => continue,
                    }
                }
                Some(Err(reqwest_eventsource::Error::StreamEnded)) => return Ok(None),
                Some(Err(reqwest_eventsource::Error::InvalidStatusCode(code, _))) => {
                    return Err(GatewayError::Provider(format!(
                        "upstream returned status {}",
                        code
                    )));
                }
                Some(Err(e)) => return Err(GatewayError::Stream(e.to_string())),
            }
        }
    });

    Ok(Box::pin(stream))
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

struct NdjsonState<F> {
    inner: ByteStream,
    buf: Vec<u8>,
    done: bool,
    extract: F,
}

/// 按行分帧的 NDJSON 流（Ollama 等非 SSE 上游）。
/// 网络分块与 UTF-8 边界无关，必须按原始字节缓冲、攒出完整行后再解码，
/// 否则跨块的多字节字符会被打成替换字符。
pub fn ndjson_text_stream<F>(bytes: ByteStream, extract: F) -> ChunkStream
where
    F: Fn(&str) -> Delta + Send + 'static,
{
    let state = NdjsonState {
        inner: bytes,
        buf: Vec::new(),
        done: false,
        extract,
    };

    let stream = futures_util::stream::try_unfold(state, |mut st| async move {
        loop {
            if st.done {
                return Ok(None);
            }

            if let Some(pos) = st.buf.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = st.buf.drain(..=pos).collect();
                let decoded = String::from_utf8_lossy(&line_bytes);
                let line = decoded.trim();
                if line.is_empty() {
                    continue;
                }
                match (st.extract)(line) {
                    Delta::Text(text) if !text.is_empty() => return Ok(Some((text, st))),
                    Delta::Done => {
                        st.done = true;
                        return Ok(None);
                    }
                    _ => continue,
                }
            }

            match st.inner.next().await {
                Some(Ok(bytes)) => {
                    st.buf.extend_from_slice(&bytes);
                }
                Some(Err(e)) => return Err(e),
                None => {
                    st.done = true;
                    let rest = std::mem::take(&mut st.buf);
                    let decoded = String::from_utf8_lossy(&rest);
                    let rest = decoded.trim();
                    if !rest.is_empty()
                        && let Delta::Text(text) = (st.extract)(rest)
                        && !text.is_empty()
                    {
                        return Ok(Some((text, st)));
                    }
                    return Ok(None);
                }
            }
        }
    });

    Box::pin(stream)
}
