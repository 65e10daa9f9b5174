//! Pending background rechecks.
//!
//! # Role
//!
//! A FIFO of [`QueueEntry`] shared between the foreground (producers) and the
//! single recheck worker (consumer). All insertion rules run under one lock:
//!
//! - an entry covered by the running, not cancelled entry of the same target is dropped unless it overrides;
//! - an entry covered by a queued entry of the same target is dropped unless it overrides;
//! - queued entries covered by the new entry are removed;
//! - an overriding entry goes ahead of the first queued entry of its document.
//!
//! The running entry carries a [`GenerationToken`]; cancelling it asks the
//! worker to abandon the entry at its next paragraph boundary. Abandoned
//! entries come back through [`RecheckQueue::requeue`].

use std::collections::VecDeque;
use std::time::Duration;

use lectern_primitives::{DocId, TextRange};
use lectern_worker::{GenerationClock, GenerationToken};
use parking_lot::{Condvar, Mutex};

use crate::config::ContextSize;


/// One pending recheck of a text paragraph range for one rule class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
	pub range: TextRange,
	pub class: usize,
	pub context: ContextSize,
	pub doc: DocId,
	pub override_running: bool,
}

impl QueueEntry {
	pub fn new(range: TextRange, class: usize, context: ContextSize, doc: DocId) -> Self {
		Self {
			range,
			class,
			context,
			doc,
			override_running: false,
		}
	}

	pub fn overriding(mut self) -> Self {
		self.override_running = true;
		self
	}

	/// Same document, rule class and context size.
	fn same_target(&self, other: &QueueEntry) -> bool {
		self.class == other.class && self.context == other.context && self.doc == other.doc
	}

	fn subsumes(&self, other: &QueueEntry) -> bool {
		self.same_target(other) && self.range.covers(&other.range)
	}
}

/// What the worker should do next.
#[derive(Debug)]
pub enum Job {
	Check { entry: QueueEntry, token: GenerationToken },
	/// Clear state and reinitialize the rule engine.
	Reset,
	Stop,
}

/// Result of [`RecheckQueue::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
	Queued,
	/// Covered by the entry the worker is running.
	Redundant,
	/// Covered by an entry already waiting.
	Covered,
	/// The queue has been stopped.
	Stopped,
}

#[derive(Debug)]
struct Running {
	entry: QueueEntry,
	token: GenerationToken,
}

#[derive(Debug, Default)]
struct QueueState {
	entries: VecDeque<QueueEntry>,
	running: Option<Running>,
	reset: bool,
	stop: bool,
	/// Ask a sleeping worker to poll its idle supplier again.
	wake: bool,
}

/// Queue of background rechecks shared by every open document.
#[derive(Debug)]
pub struct RecheckQueue {
	state: Mutex<QueueState>,
	wakeup: Condvar,
	finished: Condvar,
	clock: GenerationClock,
	interrupt_wait: Duration,
	dump: bool,
}

impl RecheckQueue {
	pub fn new(interrupt_wait: Duration) -> Self {
		Self {
			state: Mutex::new(QueueState::default()),
			wakeup: Condvar::new(),
			finished: Condvar::new(),
			clock: GenerationClock::new(),
			interrupt_wait,
			dump: false,
		}
	}

	/// Logs the whole queue after each insertion.
	pub fn with_dump(mut self, dump: bool) -> Self {
		self.dump = dump;
		self
	}

	pub fn add(&self, entry: QueueEntry) -> AddOutcome {
		let mut state = self.state.lock();
		if state.stop {
			return AddOutcome::Stopped;
		}
		if !entry.override_running {
			if let Some(running) = &state.running
				&& !running.token.is_cancelled()
				&& running.entry.subsumes(&entry)
			{
				tracing::trace!(doc = %entry.doc, class = entry.class, "queue.add.redundant");
				return AddOutcome::Redundant;
			}
			if state.entries.iter().any(|queued| queued.subsumes(&entry)) {
				tracing::trace!(doc = %entry.doc, class = entry.class, "queue.add.covered");
				return AddOutcome::Covered;
			}
		}

		let before = state.entries.len();
		state.entries.retain(|queued| !entry.subsumes(queued));
		let obsolete = before - state.entries.len();

		if entry.override_running {
			let at = state.entries.iter().position(|queued| queued.doc == entry.doc);
			if let Some(running) = &state.running
				&& running.entry.doc == entry.doc
				&& running.entry.context.is_unbounded()
				&& !running.entry.override_running
			{
				tracing::debug!(doc = %entry.doc, generation = running.token.generation(), "queue.interrupt.override");
				running.token.cancel();
			}
			match at {
				Some(at) => state.entries.insert(at, entry),
				None => state.entries.push_back(entry),
			}
		} else {
			state.entries.push_back(entry);
		}

		tracing::debug!(pending = state.entries.len(), obsolete, "queue.add");
		if self.dump {
			for (i, queued) in state.entries.iter().enumerate() {
				tracing::debug!(
					i,
					doc = %queued.doc,
					start = queued.range.start(),
					end = queued.range.end(),
					class = queued.class,
					override_running = queued.override_running,
					"queue.dump"
				);
			}
		}
		drop(state);
		self.wakeup.notify_one();
		AddOutcome::Queued
	}

	/// Blocks until there is work.
	///
	/// When the queue is empty, `idle` may supply an entry; it is queued
	/// through the normal insertion rules. Marks the returned check as running
	/// until [`Self::finish`].
	pub fn next_job(&self, mut idle: impl FnMut() -> Option<QueueEntry>) -> Job {
		loop {
			{
				let mut state = self.state.lock();
				state.running = None;
				if state.stop {
					return Job::Stop;
				}
				if state.reset {
					state.reset = false;
					return Job::Reset;
				}
				if let Some(entry) = state.entries.pop_front() {
					let token = GenerationToken::fresh(self.clock.next());
					state.running = Some(Running {
						entry: entry.clone(),
						token: token.clone(),
					});
					return Job::Check { entry, token };
				}
			}
			if let Some(entry) = idle()
				&& self.add(entry) == AddOutcome::Queued
			{
				continue;
			}
			let mut state = self.state.lock();
			if state.stop || state.reset || !state.entries.is_empty() {
				continue;
			}
			if state.wake {
				state.wake = false;
				continue;
			}
			tracing::trace!("queue.wait");
			self.wakeup.wait(&mut state);
		}
	}

	/// Marks the running entry as done.
	pub fn finish(&self) {
		self.state.lock().running = None;
		self.finished.notify_all();
	}

	/// Puts back an entry the worker abandoned, unless a reset or stop is pending.
	pub fn requeue(&self, entry: QueueEntry) -> AddOutcome {
		{
			let state = self.state.lock();
			if state.stop || state.reset {
				return AddOutcome::Stopped;
			}
		}
		tracing::debug!(doc = %entry.doc, class = entry.class, "queue.requeue");
		self.add(entry)
	}

	/// Makes a waiting worker consult its idle supplier again, for example
	/// after a document was opened.
	pub fn wake(&self) {
		self.state.lock().wake = true;
		self.wakeup.notify_one();
	}

	/// Cancels the running entry if it belongs to `doc`.
	///
	/// With `wait`, blocks until the worker yields it or the configured
	/// interrupt wait elapses. Returns true when nothing of `doc` is running
	/// afterwards.
	pub fn interrupt(&self, doc: &DocId, wait: bool) -> bool {
		let mut state = self.state.lock();
		let Some(generation) = state.running.as_ref().filter(|r| r.entry.doc == *doc).map(|r| {
			r.token.cancel();
			r.token.generation()
		}) else {
			return true;
		};
		tracing::debug!(%doc, generation, "queue.interrupt");
		if !wait {
			return false;
		}
		let still_running = |s: &mut QueueState| s.running.as_ref().is_some_and(|r| r.token.generation() == generation);
		let timed_out = self.finished.wait_while_for(&mut state, still_running, self.interrupt_wait).timed_out();
		if timed_out {
			tracing::warn!(%doc, generation, "queue.interrupt.timeout");
		}
		!timed_out
	}

	/// Removes every queued entry of a closed document and cancels its running entry.
	pub fn dispose(&self, doc: &DocId) {
		let removed = {
			let mut state = self.state.lock();
			let before = state.entries.len();
			state.entries.retain(|queued| queued.doc != *doc);
			before - state.entries.len()
		};
		tracing::debug!(%doc, removed, "queue.dispose");
		self.interrupt(doc, false);
	}

	/// Clears the queue and asks the worker to reinitialize.
	pub fn reset(&self) {
		let mut state = self.state.lock();
		state.entries.clear();
		state.reset = true;
		if let Some(running) = &state.running {
			running.token.cancel();
		}
		drop(state);
		tracing::debug!("queue.reset");
		self.wakeup.notify_all();
	}

	/// Clears the queue and ends the worker loop.
	pub fn stop(&self) {
		let mut state = self.state.lock();
		state.entries.clear();
		state.stop = true;
		if let Some(running) = &state.running {
			running.token.cancel();
		}
		drop(state);
		tracing::debug!("queue.stop");
		self.wakeup.notify_all();
	}

	pub fn len(&self) -> usize {
		self.state.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Copy of the waiting entries, head first.
	pub fn entries(&self) -> Vec<QueueEntry> {
		self.state.lock().entries.iter().cloned().collect()
	}

	pub fn running(&self) -> Option<QueueEntry> {
		self.state.lock().running.as_ref().map(|r| r.entry.clone())
	}
}
