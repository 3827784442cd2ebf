use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use serde_json::Value;
use tickerbot_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};

use crate::Error;
use crate::io::{JsonLines, LinesError};
use crate::proto::{ChatChunk, ToolCall};

struct PartialState {
    lines: JsonLines,
    // Events decoded from the last line but not yet handed out. One line
    // may carry a message delta, several tool calls and the final marker.
    pending_events: VecDeque<ModelResponseEvent>,
    tool_call_count: usize,
    done: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct OllamaResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OllamaResponse {
    #[inline]
    pub fn from_lines(lines: JsonLines) -> Self {
        let partial_state = PartialState {
            lines,
            pending_events: VecDeque::new(),
            tool_call_count: 0,
            done: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for OllamaResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    while partial_state.pending_events.is_empty() && !partial_state.done {
        let line = match partial_state.lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                return Err(Error::new(
                    "stream ended before the model finished",
                    ErrorKind::InvalidResponse,
                ));
            }
            Err(err) => {
                let kind = match err {
                    LinesError::ChunksError(_) => ErrorKind::Unreachable,
                    LinesError::InvalidPayload => ErrorKind::InvalidResponse,
                };
                return Err(Error::new(format!("{err}"), kind));
            }
        };
        trace!("got chat chunk: {line}");

        let chunk = serde_json::from_str::<ChatChunk>(&line).map_err(|err| {
            Error::new(format!("{err}"), ErrorKind::InvalidResponse)
        })?;
        decode_chunk(chunk, &mut partial_state)?;
    }

    let event = partial_state.pending_events.pop_front();
    Ok((event, partial_state))
}

fn decode_chunk(
    chunk: ChatChunk,
    partial_state: &mut PartialState,
) -> Result<(), Error> {
    if let Some(error) = chunk.error {
        return Err(Error::new(error, ErrorKind::Other));
    }

    // The order of events is important. Always emit the message delta
    // first, then the tool calls, and finally the finish reason.
    if let Some(message) = chunk.message {
        if !message.content.is_empty() {
            partial_state
                .pending_events
                .push_back(ModelResponseEvent::MessageDelta(message.content));
        }
        for tool_call in message.tool_calls {
            let id = format!("call_{}", partial_state.tool_call_count);
            partial_state.tool_call_count += 1;
            partial_state.pending_events.push_back(
                ModelResponseEvent::ToolCall(create_tool_call_request(
                    id, tool_call,
                )),
            );
        }
    }

    if chunk.done {
        let finish_reason = if partial_state.tool_call_count > 0 {
            ModelFinishReason::ToolCalls
        } else if chunk.done_reason.as_deref() == Some("length") {
            ModelFinishReason::Length
        } else {
            ModelFinishReason::Stop
        };
        partial_state
            .pending_events
            .push_back(ModelResponseEvent::Completed(finish_reason));
        partial_state.done = true;
    }
    Ok(())
}

fn create_tool_call_request(id: String, tool_call: ToolCall) -> ToolCallRequest {
    let arguments = match tool_call.function.arguments {
        // Some models send the arguments as an encoded JSON string.
        Value::String(encoded) => serde_json::from_str(&encoded)
            .unwrap_or(Value::String(encoded)),
        arguments => arguments,
    };
    ToolCallRequest {
        id,
        name: tool_call.function.name,
        arguments,
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::io::Chunks;

    fn response_from(bytes: &'static [u8]) -> OllamaResponse {
        let chunks =
            Chunks::from_vec_deque(vec![Bytes::from_static(bytes)].into());
        OllamaResponse::from_lines(JsonLines::new(chunks))
    }

    async fn collect_events(
        resp: OllamaResponse,
    ) -> Result<Vec<ModelResponseEvent>, Error> {
        let mut resp = pin!(resp);
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?
        {
            events.push(event);
        }
        Ok(events)
    }

    #[tokio::test]
    async fn test_text_events() {
        let resp = response_from(include_bytes!("../fixtures/chat_text.ndjson"));
        let events = collect_events(resp).await.unwrap();
        let text: String = events
            .iter()
            .filter_map(|event| match event {
                ModelResponseEvent::MessageDelta(delta) => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "{\"ticker\": \"AAPL\"}");
        assert_eq!(
            events.last(),
            Some(&ModelResponseEvent::Completed(ModelFinishReason::Stop))
        );
    }

    #[tokio::test]
    async fn test_tool_call_events() {
        let resp =
            response_from(include_bytes!("../fixtures/chat_tool_call.ndjson"));
        let events = collect_events(resp).await.unwrap();
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "call_0".to_owned(),
                    name: "StockPrice".to_owned(),
                    arguments: json!({ "ticker": "AAPL" }),
                }),
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "call_1".to_owned(),
                    name: "StockPrice".to_owned(),
                    arguments: json!({ "ticker": "MSFT" }),
                }),
                ModelResponseEvent::Completed(ModelFinishReason::ToolCalls),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_error() {
        let resp = response_from(
            b"{\"message\":{\"role\":\"assistant\",\"content\":\"Hi\"},\"done\":false}\n\
              {\"error\":\"out of memory\"}\n",
        );
        let err = collect_events(resp).await.unwrap_err();
        assert_eq!(err.message(), "out of memory");
    }

    #[tokio::test]
    async fn test_truncated_stream() {
        let resp = response_from(
            b"{\"message\":{\"role\":\"assistant\",\"content\":\"Hi\"},\"done\":false}\n",
        );
        let err = collect_events(resp).await.unwrap_err();
        assert_eq!(
            tickerbot_model::ModelProviderError::kind(&err),
            ErrorKind::InvalidResponse
        );
    }
}
