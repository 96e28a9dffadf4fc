//! Event Loop
//!
//! Macrotask and timer queues driving the isolate. Every dispatched
//! macrotask is followed by a microtask checkpoint.

use std::collections::VecDeque;
use std::rc::Rc;

use super::function::JsFunction;
use super::isolate::Isolate;

/// Pending timer
#[derive(Debug, Clone)]
pub struct Timer {
    pub id: u32,
    callback: Rc<JsFunction>,
    pub delay_ms: u64,
    pub scheduled_at: u64,
    pub is_interval: bool,
}

/// Event loop with macrotask and timer queues
#[derive(Debug, Default)]
pub struct EventLoop {
    /// Macrotask queue (timer callbacks, host tasks)
    macrotasks: VecDeque<Rc<JsFunction>>,
    /// Pending timers
    timers: Vec<Timer>,
    /// Next timer ID
    next_timer_id: u32,
    /// Current timestamp (ms)
    current_time: u64,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a macrotask
    pub fn queue_macrotask(&mut self, callback: Rc<JsFunction>) {
        self.macrotasks.push_back(callback);
    }

    /// Set a timeout
    pub fn set_timeout(&mut self, callback: Rc<JsFunction>, delay_ms: u64) -> u32 {
        self.add_timer(callback, delay_ms, false)
    }

    /// Set an interval
    pub fn set_interval(&mut self, callback: Rc<JsFunction>, delay_ms: u64) -> u32 {
        self.add_timer(callback, delay_ms, true)
    }

    fn add_timer(&mut self, callback: Rc<JsFunction>, delay_ms: u64, is_interval: bool) -> u32 {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        self.timers.push(Timer {
            id,
            callback,
            delay_ms,
            scheduled_at: self.current_time,
            is_interval,
        });
        id
    }

    /// Clear a timeout/interval
    pub fn clear_timer(&mut self, id: u32) {
        self.timers.retain(|t| t.id != id);
    }

    pub fn has_pending_work(&self) -> bool {
        !self.macrotasks.is_empty() || !self.timers.is_empty()
    }

    /// Advance time, queue due timers, then dispatch queued macrotasks with
    /// a microtask checkpoint after each.
    pub fn tick(&mut self, isolate: &Isolate, delta_ms: u64) {
        self.current_time += delta_ms;

        let due: Vec<Timer> = self
            .timers
            .iter()
            .filter(|t| self.current_time >= t.scheduled_at + t.delay_ms)
            .cloned()
            .collect();

        for timer in due {
            self.macrotasks.push_back(timer.callback.clone());
            if timer.is_interval {
                if let Some(t) = self.timers.iter_mut().find(|t| t.id == timer.id) {
                    t.scheduled_at = self.current_time;
                }
            } else {
                self.timers.retain(|t| t.id != timer.id);
            }
        }

        self.run_macrotasks(isolate);
    }

    fn run_macrotasks(&mut self, isolate: &Isolate) {
        while let Some(task) = self.macrotasks.pop_front() {
            if isolate.is_terminating() || isolate.is_disposed() {
                return;
            }
            if let Err(err) = task.call(isolate, &[]) {
                tracing::debug!("macrotask threw: {}", err);
            }
            isolate.run_microtasks();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::value::JsValue;
    use std::cell::Cell;

    #[test]
    fn test_timer_fires_after_delay() {
        let isolate = Isolate::new();
        let mut event_loop = EventLoop::new();
        let fired = Rc::new(Cell::new(false));

        let fired2 = fired.clone();
        event_loop.set_timeout(
            JsFunction::new(move |_, _| {
                fired2.set(true);
                Ok(JsValue::Undefined)
            }),
            10,
        );

        event_loop.tick(&isolate, 5);
        assert!(!fired.get());

        event_loop.tick(&isolate, 5);
        assert!(fired.get());
    }

    #[test]
    fn test_interval_reschedules() {
        let isolate = Isolate::new();
        let mut event_loop = EventLoop::new();
        let count = Rc::new(Cell::new(0));

        let count2 = count.clone();
        let id = event_loop.set_interval(
            JsFunction::new(move |_, _| {
                count2.set(count2.get() + 1);
                Ok(JsValue::Undefined)
            }),
            10,
        );

        event_loop.tick(&isolate, 10);
        event_loop.tick(&isolate, 10);
        assert_eq!(count.get(), 2);

        event_loop.clear_timer(id);
        event_loop.tick(&isolate, 10);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_macrotask_drives_microtask_checkpoint() {
        let isolate = Isolate::new();
        let mut event_loop = EventLoop::new();
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));

        let order2 = order.clone();
        event_loop.queue_macrotask(JsFunction::new(move |isolate, _| {
            order2.borrow_mut().push("macro");
            let order3 = order2.clone();
            isolate.queue_microtask(JsFunction::new(move |_, _| {
                order3.borrow_mut().push("micro");
                Ok(JsValue::Undefined)
            }));
            Ok(JsValue::Undefined)
        }));

        event_loop.tick(&isolate, 0);
        assert_eq!(*order.borrow(), vec!["macro", "micro"]);
    }
}
