// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// Callback-driven filter state machine.
//
// The host proxy invokes the callbacks sequentially within one exchange;
// the FilterContext carries all state between them. Errors never escape a
// callback: a scanner that cannot parse its shape silently yields to the
// next one, and the only user-visible failure is a refusal envelope.

use std::sync::Arc;

use axum::http::{header, HeaderMap};

use crate::config::FilterConfig;
use crate::context::{DenySource, FilterContext, Step};
use crate::deny::{self, Refusal};
use crate::request;
use crate::response::{self, ResponseOutcome};

// ---------------------------------------------------------------------------
// Callback results
// ---------------------------------------------------------------------------

/// What the host should do with the request after the body callback.
#[derive(Debug, PartialEq)]
pub enum RequestVerdict {
    /// Forward the body unchanged.
    Continue,
    /// Forward with the rewritten body.
    Replace(Vec<u8>),
    /// Short-circuit: answer the client with this refusal.
    Respond(Refusal),
}

/// What the host should do with a buffered response body.
#[derive(Debug, PartialEq)]
pub enum ResponseVerdict {
    Continue,
    Replace(Vec<u8>),
    Respond(Refusal),
}

/// How the response body will be delivered to the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Host buffers the whole body, then calls `on_response_body`.
    Buffered,
    /// Host calls `on_streaming_response_body` per chunk.
    Streaming,
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

pub struct Filter {
    config: Arc<FilterConfig>,
}

impl Filter {
    pub fn new(config: Arc<FilterConfig>) -> Self {
        Self { config }
    }

    /// Fresh per-exchange state.
    pub fn context(&self) -> FilterContext {
        FilterContext::new(self.config.clone())
    }

    /// Request-header callback. Drops `content-length` so the host
    /// recomputes it after any body mutation.
    pub fn on_request_headers(&self, ctx: &mut FilterContext, headers: &mut HeaderMap) {
        ctx.step = Step::RequestHeader;
        headers.remove(header::CONTENT_LENGTH);
    }

    /// Request-body callback: run the three scanners in fixed order. The
    /// first deny wins; later scanners see the output of earlier masking.
    pub fn on_request_body(&self, ctx: &mut FilterContext, body: &[u8]) -> RequestVerdict {
        ctx.step = Step::RequestBody;

        let mut current: Vec<u8> = body.to_vec();
        let mut modified = false;

        if self.config.deny_openai {
            let (replaced, denied) = request::process_openai_request(ctx, &current);
            if denied {
                return self.request_deny(ctx, DenySource::OpenAi);
            }
            if let Some(new_body) = replaced {
                current = new_body.into_bytes();
                modified = true;
                ctx.is_modified = true;
                ctx.request_deny_source = Some(DenySource::OpenAi);
            }
        }

        if !self.config.deny_jsonpath.is_empty() {
            let (replaced, denied) = request::process_jsonpath_request(ctx, &current);
            if denied {
                return self.request_deny(ctx, DenySource::JsonPath);
            }
            if let Some(new_body) = replaced {
                current = new_body.into_bytes();
                modified = true;
                ctx.is_modified = true;
                ctx.request_deny_source = Some(DenySource::JsonPath);
            }
        }

        if self.config.deny_raw {
            let (replaced, denied) = request::process_raw_request(ctx, &current);
            if denied {
                return self.request_deny(ctx, DenySource::Raw);
            }
            if let Some(new_body) = replaced {
                current = new_body.into_bytes();
                modified = true;
                ctx.is_modified = true;
                ctx.request_deny_source = Some(DenySource::Raw);
            }
        }

        if modified {
            RequestVerdict::Replace(current)
        } else {
            RequestVerdict::Continue
        }
    }

    fn request_deny(&self, ctx: &mut FilterContext, source: DenySource) -> RequestVerdict {
        ctx.is_request_deny = true;
        ctx.request_deny_source = Some(source);
        tracing::info!(
            source = source.as_str(),
            step = ctx.step.as_str(),
            "request denied"
        );
        RequestVerdict::Respond(deny::request_refusal(ctx, source))
    }

    /// Response-header callback. `content-type: text/event-stream` is
    /// authoritative for streaming; everything else is buffered.
    pub fn on_response_headers(&self, ctx: &mut FilterContext, headers: &HeaderMap) -> ResponseMode {
        ctx.step = Step::ResponseHeader;
        if ctx.is_request_deny {
            // The refusal was already sent in the request phase.
            return ResponseMode::Buffered;
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        ctx.resp_is_sse = content_type.contains("text/event-stream");

        if ctx.resp_is_sse {
            ResponseMode::Streaming
        } else {
            ResponseMode::Buffered
        }
    }

    /// Buffered response-body callback.
    pub fn on_response_body(&self, ctx: &mut FilterContext, body: &[u8]) -> ResponseVerdict {
        ctx.step = Step::ResponseBody;
        if ctx.is_request_deny {
            return ResponseVerdict::Continue;
        }

        if self.config.deny_openai {
            match response::process_openai_response(ctx, body) {
                ResponseOutcome::NotApplicable => {}
                ResponseOutcome::Pass => return ResponseVerdict::Continue,
                ResponseOutcome::Replace(new_body) => {
                    ctx.is_modified = true;
                    ctx.response_deny_source = Some(DenySource::OpenAi);
                    return ResponseVerdict::Replace(new_body.into_bytes());
                }
                ResponseOutcome::Deny => {
                    return self.response_deny(ctx, DenySource::OpenAi);
                }
            }
        }

        // Non-completion shapes: the scanner recorded at request time
        // decides how the refusal is framed.
        let raw_source = match ctx.request_deny_source {
            Some(DenySource::JsonPath) => DenySource::JsonPath,
            _ => DenySource::Raw,
        };
        let raw_applies = self.config.deny_raw
            || matches!(
                ctx.request_deny_source,
                Some(DenySource::JsonPath) | Some(DenySource::Raw)
            )
            || !ctx.mask_map.is_empty();
        if raw_applies {
            match response::process_raw_response(ctx, body) {
                ResponseOutcome::NotApplicable | ResponseOutcome::Pass => {}
                ResponseOutcome::Replace(new_body) => {
                    ctx.is_modified = true;
                    return ResponseVerdict::Replace(new_body.into_bytes());
                }
                ResponseOutcome::Deny => {
                    return self.response_deny(ctx, raw_source);
                }
            }
        }

        ResponseVerdict::Continue
    }

    fn response_deny(&self, ctx: &mut FilterContext, source: DenySource) -> ResponseVerdict {
        ctx.is_response_deny = true;
        ctx.response_deny_source = Some(source);
        tracing::info!(
            source = source.as_str(),
            step = ctx.step.as_str(),
            "response denied"
        );
        ResponseVerdict::Respond(deny::response_refusal(ctx, source))
    }

    /// Streaming response-body callback. Returns the bytes to forward
    /// downstream; empty while the accumulator buffers or after it has
    /// denied/closed the stream.
    pub fn on_streaming_response_body(
        &self,
        ctx: &mut FilterContext,
        chunk: &[u8],
        is_last: bool,
    ) -> Vec<u8> {
        ctx.step = Step::StreamResponseBody;
        if ctx.is_request_deny {
            return Vec::new();
        }
        if !self.config.deny_openai {
            return chunk.to_vec();
        }

        let model = ctx.openai_request.model.clone();
        let out = ctx
            .accumulator
            .process_chunk(chunk, is_last, &self.config, &model);
        if ctx.accumulator.is_denied() && !ctx.is_response_deny {
            ctx.is_response_deny = true;
            ctx.response_deny_source = Some(DenySource::OpenAi);
            tracing::info!(step = ctx.step.as_str(), "stream denied");
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DenyStrategy, FilterConfig};

    fn filter(words: &[&str]) -> Filter {
        Filter::new(Arc::new(FilterConfig {
            deny_words: words.iter().map(|s| s.to_string()).collect(),
            ..FilterConfig::default()
        }))
    }

    #[test]
    fn request_headers_drop_content_length() {
        let filter = filter(&[]);
        let mut ctx = filter.context();
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, "42".parse().unwrap());

        filter.on_request_headers(&mut ctx, &mut headers);
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
        assert_eq!(ctx.step, Step::RequestHeader);
    }

    #[test]
    fn openai_deny_short_circuits_remaining_scanners() {
        let filter = Filter::new(Arc::new(FilterConfig {
            deny_words: vec!["敏感词1".to_string()],
            deny_raw: true,
            ..FilterConfig::default()
        }));
        let mut ctx = filter.context();
        let body = (r#"{"model":"m","messages":[{"role":"user","content":"敏感词1"}]}"#).as_bytes();

        let RequestVerdict::Respond(refusal) = filter.on_request_body(&mut ctx, body) else {
            panic!("expected refusal");
        };
        // The chat-completion scanner fired, not the raw fallback.
        assert_eq!(refusal.source, DenySource::OpenAi);
        assert!(ctx.is_request_deny);
        assert_eq!(ctx.step, Step::RequestBody);
    }

    #[test]
    fn raw_scanner_catches_what_openai_shape_misses() {
        let filter = Filter::new(Arc::new(FilterConfig {
            deny_words: vec!["secret".to_string()],
            deny_raw: true,
            ..FilterConfig::default()
        }));
        let mut ctx = filter.context();

        let RequestVerdict::Respond(refusal) =
            filter.on_request_body(&mut ctx, br#"{"query":"a secret"}"#)
        else {
            panic!("expected refusal");
        };
        assert_eq!(refusal.source, DenySource::Raw);
        let v: serde_json::Value = serde_json::from_slice(&refusal.body).unwrap();
        assert_eq!(v["code"], 200);
        assert_eq!(v["message"], ctx.config.deny_message.as_str());
        assert!(v["data"].as_object().unwrap().is_empty());
    }

    #[test]
    fn clean_request_continues() {
        let filter = filter(&["敏感词1"]);
        let mut ctx = filter.context();
        let body = br#"{"model":"m","messages":[{"role":"user","content":"hello"}]}"#;
        assert_eq!(filter.on_request_body(&mut ctx, body), RequestVerdict::Continue);
        assert!(!ctx.is_request_deny);
    }

    #[test]
    fn response_mode_follows_content_type() {
        let filter = filter(&[]);
        let mut ctx = filter.context();

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        assert_eq!(
            filter.on_response_headers(&mut ctx, &headers),
            ResponseMode::Buffered
        );
        assert!(!ctx.resp_is_sse);

        headers.insert(
            header::CONTENT_TYPE,
            "text/event-stream; charset=utf-8".parse().unwrap(),
        );
        assert_eq!(
            filter.on_response_headers(&mut ctx, &headers),
            ResponseMode::Streaming
        );
        assert!(ctx.resp_is_sse);
    }

    #[test]
    fn chunked_without_event_stream_stays_buffered() {
        let filter = filter(&[]);
        let mut ctx = filter.context();
        let mut headers = HeaderMap::new();
        headers.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        assert_eq!(
            filter.on_response_headers(&mut ctx, &headers),
            ResponseMode::Buffered
        );
    }

    #[test]
    fn response_body_deny_produces_completion_refusal() {
        let filter = filter(&["敏感词1"]);
        let mut ctx = filter.context();
        ctx.openai_request.model = "m".to_string();
        let body = (r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"含 敏感词1"}}]}"#).as_bytes();

        let ResponseVerdict::Respond(refusal) = filter.on_response_body(&mut ctx, body) else {
            panic!("expected refusal");
        };
        assert!(ctx.is_response_deny);
        assert_eq!(refusal.step, Step::ResponseBody);
        let v: serde_json::Value = serde_json::from_slice(&refusal.body).unwrap();
        assert_eq!(v["object"], "chat.completion");
        assert_eq!(v["model"], "m");
    }

    #[test]
    fn callbacks_after_request_deny_are_inert() {
        let filter = filter(&["敏感词1"]);
        let mut ctx = filter.context();
        ctx.is_request_deny = true;

        assert_eq!(
            filter.on_response_body(&mut ctx, (r#"{"choices":[{"message":{"content":"敏感词1"}}]}"#).as_bytes()),
            ResponseVerdict::Continue
        );
        assert!(filter
            .on_streaming_response_body(&mut ctx, b"data: x\n\n", false)
            .is_empty());
    }

    #[test]
    fn streaming_deny_marks_context() {
        let filter = filter(&["敏感词1"]);
        let mut ctx = filter.context();
        ctx.openai_request.model = "m".to_string();

        let chunk = format!(
            "data: {}\n\n",
            serde_json::json!({"choices":[{"delta":{"content":"敏感词1"}}]})
        );
        let out = filter.on_streaming_response_body(&mut ctx, chunk.as_bytes(), false);
        assert!(!out.is_empty());
        assert!(ctx.is_response_deny);
        assert_eq!(ctx.response_deny_source, Some(DenySource::OpenAi));
        assert_eq!(ctx.config.response_deny_plot.strategy, DenyStrategy::Block);
    }
}
