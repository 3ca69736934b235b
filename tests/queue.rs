//! Work queue ordering and capacity behavior.

use std::cell::Cell;

use libshadow::agent::CloudAgent;
use libshadow::error::Error;
use libshadow::queue::{WORK_QUEUE_DEPTH, Work, WorkItem, WorkQueue};

struct Tagged {
    tag: u32,
    last_run: Cell<u32>,
}

impl Tagged {
    fn new(tag: u32) -> Self {
        Tagged {
            tag,
            last_run: Cell::new(0),
        }
    }
}

impl Work for Tagged {
    fn run(&self, _agent: &mut dyn CloudAgent) {
        self.last_run.set(self.tag);
    }
}

#[test]
fn items_come_out_in_submission_order() {
    let works: Vec<Tagged> = (1..=3).map(Tagged::new).collect();
    let queue = WorkQueue::new();
    for work in &works {
        queue.submit_work(work).unwrap();
    }
    queue.submit_stop().unwrap();

    for expected in 1..=3u32 {
        match queue.take() {
            Some(WorkItem::User(work)) => {
                // Identify the registration through its tag field.
                let tagged = &works[(expected - 1) as usize];
                work.run(&mut NullAgent);
                assert_eq!(tagged.last_run.get(), expected);
            }
            other => panic!("expected user work, got {other:?}"),
        }
    }
    assert!(matches!(queue.take(), Some(WorkItem::Stop)));
    assert!(queue.take().is_none());
}

#[test]
fn full_queue_rejects_without_blocking() {
    let work = Tagged::new(0);
    let queue = WorkQueue::new();
    for _ in 0..WORK_QUEUE_DEPTH {
        queue.submit_work(&work).unwrap();
    }
    assert_eq!(queue.submit_work(&work), Err(Error::QueueFull));

    // Draining one slot makes room again.
    assert!(queue.take().is_some());
    queue.submit_work(&work).unwrap();
}

#[test]
fn take_on_empty_queue_is_none() {
    let queue = WorkQueue::new();
    assert!(queue.take().is_none());
}

/// Minimal facade for exercising `Work::run` without a full agent.
struct NullAgent;

impl CloudAgent for NullAgent {
    fn device_id(&self) -> &str {
        "null"
    }

    fn update_bool_param(&mut self, _name: &str, _value: bool) -> Result<(), Error> {
        Ok(())
    }

    fn update_int_param(&mut self, _name: &str, _value: i32) -> Result<(), Error> {
        Ok(())
    }

    fn update_float_param(&mut self, _name: &str, _value: f32) -> Result<(), Error> {
        Ok(())
    }

    fn update_string_param(&mut self, _name: &str, _value: &str) -> Result<(), Error> {
        Ok(())
    }

    fn publish_diagnostics(
        &mut self,
        _payload: &libshadow::diagnostics::DiagPayload<'_>,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn request_stop(&mut self) {}
}
