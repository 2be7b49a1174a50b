//! Streaming scenarios: ordering, cancellation, and the commit point

use crate::common::{default_config, testbed};
use modelgate::core::providers::StreamScript;
use modelgate::core::types::Usage;
use modelgate::{CompletionRequest, GatewayError, ProviderError, RequestContext};
use futures::StreamExt;
use std::time::Duration;

fn stream_request() -> CompletionRequest {
    CompletionRequest::new("gpt-x")
        .add_user_message("tell me a story")
        .with_user("u1")
        .with_streaming()
}

fn four_chunk_script() -> StreamScript {
    StreamScript {
        error_before_first_chunk: None,
        chunks: vec!["C1".to_string(), "C2".to_string(), "C3".to_string()],
        fail_after: None,
        usage: Usage::completion(12, 3),
    }
}

// Chunks arrive in provider order, the final chunk carries usage, and
// exactly one usage record lands in the ledger.
#[tokio::test]
async fn chunks_preserve_order_and_track_usage_once() {
    let bed = testbed(default_config());
    bed.alpha.enqueue_stream(four_chunk_script());

    let mut stream = bed
        .gateway
        .completion_stream(stream_request(), RequestContext::default())
        .await
        .expect("stream opens");

    let mut texts = Vec::new();
    let mut final_usage = None;
    while let Some(item) = stream.next().await {
        let chunk = item.expect("chunk ok");
        assert_eq!(chunk.model, "gpt-x");
        assert_eq!(chunk.provider, "alpha");
        if chunk.is_final() {
            final_usage = chunk.usage;
        } else {
            texts.push(chunk.delta_text());
        }
    }

    assert_eq!(texts, vec!["C1", "C2", "C3"]);
    assert_eq!(final_usage, Some(Usage::completion(12, 3)));

    // Usage tracking is part of final-chunk handling; it completed before
    // the stream ended.
    assert_eq!(bed.usage_repo.len(), 1);
}

// S7: the consumer cancels after two chunks. The observed prefix stays in
// order, the provider sees the cancellation, and no usage is recorded.
#[tokio::test]
async fn consumer_cancellation_propagates_and_skips_tracking() {
    let bed = testbed(default_config());
    bed.alpha.enqueue_stream(four_chunk_script());

    let mut stream = bed
        .gateway
        .completion_stream(stream_request(), RequestContext::default())
        .await
        .expect("stream opens");

    let c1 = stream.next().await.unwrap().unwrap();
    let c2 = stream.next().await.unwrap().unwrap();
    assert_eq!(c1.delta_text(), "C1");
    assert_eq!(c2.delta_text(), "C2");

    drop(stream);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(bed.alpha.cancellation_observed());
    assert_eq!(bed.usage_repo.len(), 0);
}

// A provider failure before any chunk was delivered may fall back, just
// like the unary path.
#[tokio::test]
async fn pre_delivery_failure_falls_back() {
    let bed = testbed(default_config());
    bed.alpha.enqueue_stream(StreamScript {
        error_before_first_chunk: Some(ProviderError::rate_limit("alpha", None)),
        ..Default::default()
    });

    let mut stream = bed
        .gateway
        .completion_stream(stream_request(), RequestContext::default())
        .await
        .expect("fallback stream opens");

    let mut texts = Vec::new();
    while let Some(item) = stream.next().await {
        let chunk = item.expect("chunk ok");
        // Identity restoration applies to streams too.
        assert_eq!(chunk.model, "gpt-x");
        assert_eq!(chunk.provider, "beta");
        if !chunk.is_final() {
            texts.push(chunk.delta_text());
        }
    }
    assert_eq!(texts, vec!["Hello", " world"]);
    assert_eq!(bed.usage_repo.len(), 1);
}

// Once a chunk has been delivered the stream is committed: a mid-stream
// failure surfaces as a partial error and no other provider is tried.
#[tokio::test]
async fn mid_stream_failure_is_partial_error_not_restart() {
    let bed = testbed(default_config());
    bed.alpha.enqueue_stream(StreamScript {
        error_before_first_chunk: None,
        chunks: vec!["C1".to_string(), "C2".to_string()],
        fail_after: Some(1),
        usage: Usage::completion(5, 5),
    });

    let mut stream = bed
        .gateway
        .completion_stream(stream_request(), RequestContext::default())
        .await
        .expect("stream opens");

    let first = stream.next().await.unwrap().expect("first chunk ok");
    assert_eq!(first.delta_text(), "C1");

    let second = stream.next().await.unwrap();
    assert!(matches!(second, Err(GatewayError::Provider(_))));
    assert!(stream.next().await.is_none());

    // No silent restart on another provider, no usage for the partial.
    assert_eq!(bed.beta.stream_calls(), 0);
    assert_eq!(bed.gamma.stream_calls(), 0);
    assert_eq!(bed.usage_repo.len(), 0);
}

// Client-side cancellation through the context token stops emission.
#[tokio::test]
async fn context_cancellation_stops_stream() {
    let bed = testbed(default_config());
    bed.alpha.enqueue_stream(four_chunk_script());

    let ctx = RequestContext::default();
    let token = ctx.cancellation.clone();

    let mut stream = bed
        .gateway
        .completion_stream(stream_request(), ctx)
        .await
        .expect("stream opens");

    let _ = stream.next().await.unwrap().unwrap();
    token.cancel();

    // The stream ends promptly instead of emitting the remaining chunks.
    let mut remaining = 0;
    while let Some(item) = stream.next().await {
        if item.is_ok() {
            remaining += 1;
        }
    }
    assert!(remaining < 3, "cancellation should cut the stream short");
    assert_eq!(bed.usage_repo.len(), 0);
}

// Streaming requests are never written to the response cache.
#[tokio::test]
async fn streams_are_not_cached() {
    let bed = testbed(default_config());
    bed.alpha.enqueue_stream(four_chunk_script());
    bed.alpha.enqueue_stream(four_chunk_script());

    for _ in 0..2 {
        let mut stream = bed
            .gateway
            .completion_stream(stream_request(), RequestContext::default())
            .await
            .expect("stream opens");
        while let Some(item) = stream.next().await {
            item.expect("chunk ok");
        }
    }

    assert_eq!(bed.alpha.stream_calls(), 2);
    assert_eq!(bed.usage_repo.len(), 2);
}
