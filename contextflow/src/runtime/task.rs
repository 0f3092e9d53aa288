//! Futures driven as task frames.

use crate::config::ContextConfig;
use crate::context::{Context, ContextSlot};
use crate::errors::{ContextError, ContextResult};
use crate::frame::{ExitState, Frame, FrameId, FrameKind};
use futures::future::FusedFuture;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{self, Poll};
use tracing::warn;

/// A future running in its own task frame.
///
/// The frame captures a context when the future is created. Every poll
/// makes that branch the active context of the polling thread's slot and
/// puts the thread's previous context back before returning, so sibling
/// tasks sharing a worker thread never see each other's writes. Futures
/// awaited inside are polled within the same poll and therefore share the
/// task's branch.
///
/// Dropping a suspended task enters its frame once more, so destructors of
/// the wrapped future observe the task's own context.
pub struct TaskFuture<F> {
    frame: Frame<Option<Pin<Box<F>>>>,
}

impl<F: Future> TaskFuture<F> {
    /// Wraps `future`, capturing the calling thread's active context.
    ///
    /// The task reports frame events to the thread slot's sink, if any.
    pub fn capture(future: F) -> Self {
        let frame = ContextSlot::with_thread(|slot| {
            Frame::builder(FrameKind::Task, Some(Box::pin(future))).capture(slot)
        });
        Self { frame }
    }

    /// Like [`TaskFuture::capture`], with frame events set by `config`.
    pub fn configured(future: F, config: &ContextConfig) -> Self {
        let frame = ContextSlot::with_thread(|slot| {
            Frame::builder(FrameKind::Task, Some(Box::pin(future)))
                .configured(config)
                .capture(slot)
        });
        Self { frame }
    }

    /// Wraps `future` to run on `context`.
    ///
    /// The handle is only read: writes made by the future stay in the task's
    /// own branch.
    pub fn with_context(future: F, context: Context) -> Self {
        Self {
            frame: Frame::builder(FrameKind::Task, Some(Box::pin(future))).build(context),
        }
    }

    /// Like [`TaskFuture::with_context`], with frame events set by `config`.
    pub fn with_config(future: F, context: Context, config: &ContextConfig) -> Self {
        Self {
            frame: Frame::builder(FrameKind::Task, Some(Box::pin(future)))
                .configured(config)
                .build(context),
        }
    }

    /// Returns the task's frame id.
    #[must_use]
    pub fn frame_id(&self) -> FrameId {
        self.frame.id()
    }

    /// Returns the task's branch as of its last poll.
    #[must_use]
    pub fn saved_context(&self) -> &Context {
        self.frame.saved_context()
    }

    fn poll_on(
        &mut self,
        slot: &ContextSlot,
        cx: &mut task::Context<'_>,
    ) -> Poll<ContextResult<F::Output>> {
        if let Err(error) = self.frame.enter(slot) {
            return Poll::Ready(Err(error));
        }
        let frame = &mut self.frame;
        let polled = panic::catch_unwind(AssertUnwindSafe(|| match frame.coroutine_mut() {
            Some(future) => future.as_mut().poll(cx).map(Some),
            None => Poll::Ready(None),
        }));

        let (next, result) = match polled {
            Ok(Poll::Pending) => (ExitState::Suspended, Poll::Pending),
            Ok(Poll::Ready(Some(output))) => {
                (ExitState::Completed, Poll::Ready(Ok(output)))
            }
            Ok(Poll::Ready(None)) => (
                ExitState::Failed,
                Poll::Ready(Err(ContextError::frame_failed(
                    frame.id(),
                    anyhow::anyhow!("task future is gone"),
                ))),
            ),
            Err(payload) => {
                frame.coroutine_mut().take();
                let _ = frame.exit(slot, ExitState::Failed);
                panic::resume_unwind(payload)
            }
        };
        if next != ExitState::Suspended {
            frame.coroutine_mut().take();
        }
        match frame.exit(slot, next) {
            Ok(()) => result,
            Err(error) => Poll::Ready(Err(error)),
        }
    }
}

impl<F: Future> Future for TaskFuture<F> {
    type Output = ContextResult<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        ContextSlot::with_thread(|slot| this.poll_on(slot, cx))
    }
}

impl<F: Future> FusedFuture for TaskFuture<F> {
    fn is_terminated(&self) -> bool {
        self.frame.state().is_terminal()
    }
}

impl<F> Drop for TaskFuture<F> {
    fn drop(&mut self) {
        if self.frame.coroutine().is_none() {
            return;
        }
        let frame = &mut self.frame;
        let dropped = ContextSlot::try_with_thread(|slot| {
            if frame.enter(slot).is_err() {
                return false;
            }
            frame.coroutine_mut().take();
            let _ = frame.exit(slot, ExitState::Completed);
            true
        });
        if dropped != Some(true) {
            warn!(frame_id = %frame.id(), "Task future dropped outside its context");
        }
    }
}

impl<F> fmt::Debug for TaskFuture<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("frame", &self.frame)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameEventMode;
    use crate::context::ambient;
    use crate::frame::{CollectingFrameSink, FrameEventSink, FrameEventType, FrameState};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready};

    /// Returns `Pending` once, then completes.
    fn yield_once() -> impl Future<Output = ()> {
        let mut yielded = false;
        futures::future::poll_fn(move |cx| {
            if yielded {
                Poll::Ready(())
            } else {
                yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        })
    }

    struct Probe(Arc<Mutex<Option<serde_json::Value>>>);

    impl Drop for Probe {
        fn drop(&mut self) {
            *self.0.lock() = Some(ambient::get_item("owner", json!(null)));
        }
    }

    /// Claims the task's branch, then panics. Records the owner it sees
    /// when dropped.
    struct PanicsOnPoll(Arc<Mutex<Option<serde_json::Value>>>);

    impl Future for PanicsOnPoll {
        type Output = ();

        fn poll(self: Pin<&mut Self>, _cx: &mut task::Context<'_>) -> Poll<()> {
            ambient::set_item("owner", json!("task")).unwrap();
            panic!("task panicked");
        }
    }

    impl Drop for PanicsOnPoll {
        fn drop(&mut self) {
            *self.0.lock() = Some(ambient::get_item("owner", json!(null)));
        }
    }

    #[test]
    fn test_each_poll_restores_thread_context() {
        ambient::adopt_handle(Context::new());
        let mut task = tokio_test::task::spawn(TaskFuture::capture(async {
            ambient::set_item("owner", json!("task")).unwrap();
            yield_once().await;
            ambient::get_item("owner", json!(null))
        }));

        assert_pending!(task.poll());
        assert!(!ambient::current_handle().contains("owner"));

        ambient::set_item("owner", json!("driver")).unwrap();
        let output = assert_ready!(task.poll()).unwrap();

        assert_eq!(output, json!("task"));
        assert_eq!(ambient::get_item("owner", json!(null)), json!("driver"));
        assert!(task.is_terminated());
    }

    #[test]
    fn test_with_context_never_writes_back() {
        let handle = Context::new().set("x", json!(10)).unwrap();
        let mut task = tokio_test::task::spawn(TaskFuture::with_context(
            async {
                ambient::set_item("x", json!(20)).unwrap();
                ambient::get_item("x", json!(null))
            },
            handle.clone(),
        ));

        assert_eq!(assert_ready!(task.poll()).unwrap(), json!(20));
        assert_eq!(handle.get("x"), Some(&json!(10)));
    }

    #[test]
    fn test_polling_after_completion_is_an_error() {
        let mut task = TaskFuture::capture(async {});
        let waker = futures::task::noop_waker();
        let mut cx = task::Context::from_waker(&waker);

        assert!(matches!(Pin::new(&mut task).poll(&mut cx), Poll::Ready(Ok(()))));
        assert!(matches!(
            Pin::new(&mut task).poll(&mut cx),
            Poll::Ready(Err(ContextError::FrameFinished { .. }))
        ));
        assert_eq!(task.frame.state(), FrameState::Completed);
    }

    #[test]
    fn test_drop_while_suspended_runs_destructors_in_task_context() {
        ambient::adopt_handle(Context::new());
        let seen = Arc::new(Mutex::new(None));
        let probe_seen = seen.clone();

        let mut task = tokio_test::task::spawn(TaskFuture::capture(async move {
            let _probe = Probe(probe_seen);
            ambient::set_item("owner", json!("task")).unwrap();
            yield_once().await;
        }));
        assert_pending!(task.poll());
        ambient::set_item("owner", json!("driver")).unwrap();
        drop(task);

        assert_eq!(*seen.lock(), Some(json!("task")));
        assert_eq!(ambient::get_item("owner", json!(null)), json!("driver"));
        assert_eq!(ContextSlot::with_thread(ContextSlot::depth), 0);
    }

    #[test]
    fn test_panic_in_future_restores_thread_context() {
        ambient::adopt_handle(Context::new());
        let before = ambient::current_handle();
        let mut task = TaskFuture::capture(async {
            ambient::set_item("owner", json!("task")).unwrap();
            panic!("task panicked");
        });
        let waker = futures::task::noop_waker();
        let mut cx = task::Context::from_waker(&waker);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| Pin::new(&mut task).poll(&mut cx)));

        assert!(outcome.is_err());
        assert!(ambient::current_handle().same_version(&before));
        assert!(task.is_terminated());
    }

    #[test]
    fn test_panicking_future_is_dropped_in_task_context() {
        ambient::adopt_handle(Context::new());
        ambient::set_item("owner", json!("driver")).unwrap();
        let seen = Arc::new(Mutex::new(None));
        let mut task = TaskFuture::capture(PanicsOnPoll(seen.clone()));
        let waker = futures::task::noop_waker();
        let mut cx = task::Context::from_waker(&waker);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| Pin::new(&mut task).poll(&mut cx)));

        assert!(outcome.is_err());
        assert_eq!(*seen.lock(), Some(json!("task")));
        assert_eq!(ambient::get_item("owner", json!(null)), json!("driver"));
        assert_eq!(ContextSlot::with_thread(ContextSlot::depth), 0);
    }

    #[test]
    fn test_capture_reports_to_thread_sink() {
        let collected = Arc::new(CollectingFrameSink::new());
        let sink = collected.clone() as Arc<dyn FrameEventSink>;

        std::thread::spawn(move || {
            ContextSlot::with_thread(|slot| slot.set_event_sink(Some(sink)));
            let mut task = tokio_test::task::spawn(TaskFuture::capture(async {}));
            assert_ready!(task.poll()).unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(
            collected.event_types(),
            vec![
                FrameEventType::Created,
                FrameEventType::Entered,
                FrameEventType::Exited,
            ]
        );
    }

    #[test]
    fn test_config_overrides_thread_sink() {
        let collected = Arc::new(CollectingFrameSink::new());
        let sink = collected.clone() as Arc<dyn FrameEventSink>;
        let quiet = ContextConfig::default().with_frame_events(FrameEventMode::Off);

        std::thread::spawn(move || {
            ContextSlot::with_thread(|slot| slot.set_event_sink(Some(sink)));
            let mut task = tokio_test::task::spawn(TaskFuture::configured(async {}, &quiet));
            assert_ready!(task.poll()).unwrap();
            let mut task = tokio_test::task::spawn(TaskFuture::with_config(
                async {},
                Context::new(),
                &quiet,
            ));
            assert_ready!(task.poll()).unwrap();
        })
        .join()
        .unwrap();

        assert!(collected.is_empty());
    }
}
