//! Running futures as context-isolated tasks on tokio.
//!
//! A task captures the spawner's context and then evolves its own branch.
//! Awaiting a plain future inside a task is delegation: the awaited code
//! reads and writes the task's branch directly.

mod task;

pub use task::TaskFuture;

use crate::config::ContextConfig;
use crate::context::Context;
use crate::errors::ContextResult;
use std::future::Future;
use tokio::task::JoinHandle;

/// Spawns `future` on the current tokio runtime as an isolated task.
///
/// The task starts with the caller's active context. Its writes never reach
/// the caller or sibling tasks.
///
/// # Panics
///
/// Panics when called outside a tokio runtime, like [`tokio::spawn`].
pub fn spawn_task<F>(future: F) -> JoinHandle<ContextResult<F::Output>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(TaskFuture::capture(future))
}

/// Like [`spawn_task`], with the task's frame events set by `config`.
///
/// The frame depth limit belongs to the worker thread's slot; apply it with
/// [`ContextSlot::configure_thread`](crate::context::ContextSlot::configure_thread)
/// in the runtime's `on_thread_start`.
///
/// # Panics
///
/// Panics when called outside a tokio runtime, like [`tokio::spawn`].
pub fn spawn_task_with<F>(
    config: &ContextConfig,
    future: F,
) -> JoinHandle<ContextResult<F::Output>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(TaskFuture::configured(future, config))
}

/// Runs `future` isolated on `handle`.
///
/// `handle` is a template: the future's writes stay in its own branch and
/// the caller's context is untouched.
pub fn scope<F: Future>(handle: Context, future: F) -> TaskFuture<F> {
    TaskFuture::with_context(future, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ENV_FRAME_EVENTS, ENV_MAX_FRAME_DEPTH};
    use crate::context::{ambient, ContextSlot};
    use crate::errors::ContextError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_spawned_task_inherits_spawner_context() {
        ambient::set_item("request_id", json!("r-1")).unwrap();

        let seen = spawn_task(async { ambient::get_item("request_id", json!(null)) })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(seen, json!("r-1"));
    }

    #[tokio::test]
    async fn test_task_writes_do_not_leak_to_spawner() {
        ambient::adopt_handle(Context::new());

        spawn_task(async {
            ambient::set_item("leak", json!(true)).unwrap();
        })
        .await
        .unwrap()
        .unwrap();

        assert!(!ambient::current_handle().contains("leak"));
    }

    #[tokio::test]
    async fn test_sibling_tasks_are_isolated() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                spawn_task(async move {
                    ambient::set_item("key", json!(i)).unwrap();
                    tokio::task::yield_now().await;
                    ambient::get_item("key", json!(null))
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), json!(i));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_isolation_holds_across_worker_threads() {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                spawn_task(async move {
                    ambient::set_item("key", json!(i)).unwrap();
                    for _ in 0..8 {
                        tokio::task::yield_now().await;
                        assert_eq!(ambient::get_item("key", json!(null)), json!(i));
                    }
                    ambient::get_item("key", json!(null))
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), json!(i));
        }
    }

    #[tokio::test]
    async fn test_await_inside_task_is_delegation() {
        async fn inner() {
            ambient::set_item("key", json!(2)).unwrap();
            tokio::task::yield_now().await;
        }

        let seen = spawn_task(async {
            ambient::set_item("key", json!(1)).unwrap();
            inner().await;
            ambient::get_item("key", json!(null))
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(seen, json!(2));
    }

    #[tokio::test]
    async fn test_scope_uses_handle_as_template() {
        ambient::adopt_handle(Context::new());
        let handle = Context::new().set("x", json!(10)).unwrap();

        let inside = scope(handle.clone(), async {
            ambient::set_item("x", json!(20)).unwrap();
            ambient::get_item("x", json!(null))
        })
        .await
        .unwrap();

        assert_eq!(inside, json!(20));
        assert_eq!(handle.get("x"), Some(&json!(10)));
        assert!(!ambient::current_handle().contains("x"));
    }

    #[tokio::test]
    async fn test_nested_scope_inside_task_does_not_leak_into_task() {
        let seen = spawn_task(async {
            ambient::set_item("key", json!("task")).unwrap();
            scope(Context::new(), async {
                ambient::set_item("key", json!("scoped")).unwrap();
            })
            .await
            .unwrap();
            ambient::get_item("key", json!(null))
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(seen, json!("task"));
    }

    #[test]
    fn test_env_settings_reach_configured_workers() {
        let config = ContextConfig::from_lookup(|name| match name {
            ENV_MAX_FRAME_DEPTH => Some("1".to_string()),
            ENV_FRAME_EVENTS => Some("log".to_string()),
            _ => None,
        })
        .unwrap();
        let worker_config = config.clone();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .on_thread_start(move || ContextSlot::configure_thread(&worker_config))
            .enable_all()
            .build()
            .unwrap();

        let (limit, events_on, nested) = runtime.block_on(async {
            spawn_task_with(&config, async {
                let (limit, events_on) = ContextSlot::with_thread(|slot| {
                    let sink = slot.event_sink();
                    (slot.max_frame_depth(), sink.is_some_and(|sink| sink.enabled()))
                });
                let nested = scope(Context::new(), async {}).await;
                (limit, events_on, nested)
            })
            .await
            .unwrap()
            .unwrap()
        });

        assert_eq!(limit, 1);
        assert!(events_on);
        assert!(matches!(
            nested,
            Err(ContextError::FrameDepthExceeded { limit: 1 })
        ));
    }
}
