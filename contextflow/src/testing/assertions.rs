//! Test assertions for contexts and frames.

use crate::context::{Context, ContextValue, IntoContextKey};
use crate::frame::{Frame, FrameState};

/// Asserts that `key` is bound to `expected`.
pub fn assert_context_value(context: &Context, key: impl IntoContextKey, expected: &ContextValue) {
    let key = key.into_lookup_key();
    let actual = context.get(&key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected value {:?} for key '{}', got {:?}. Context: {:?}",
        expected,
        key,
        actual,
        context
    );
}

/// Asserts that `key` is not bound.
pub fn assert_context_lacks(context: &Context, key: impl IntoContextKey) {
    let key = key.into_lookup_key();
    assert!(
        !context.contains(&key),
        "Expected context to lack key '{}', but it is bound to {:?}",
        key,
        context.get(&key)
    );
}

/// Asserts that two handles refer to the same version.
pub fn assert_same_version(actual: &Context, expected: &Context) {
    assert!(
        actual.same_version(expected),
        "Expected the same context version, got {actual:?} and {expected:?}"
    );
}

/// Asserts that the frame is in the expected state.
pub fn assert_frame_state<C>(frame: &Frame<C>, expected: FrameState) {
    assert_eq!(
        frame.state(),
        expected,
        "Expected frame {} to be {}, got {}",
        frame.id(),
        expected,
        frame.state()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_assertions() {
        let ctx = Context::new().set("a", json!(1)).unwrap();
        assert_context_value(&ctx, "a", &json!(1));
        assert_context_lacks(&ctx, "b");
        assert_same_version(&ctx, &ctx.copy());
    }

    #[test]
    #[should_panic(expected = "Expected context to lack key 'a'")]
    fn test_lacks_fails_when_bound() {
        let ctx = Context::new().set("a", json!(1)).unwrap();
        assert_context_lacks(&ctx, "a");
    }
}
