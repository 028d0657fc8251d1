//! Signals emitted by the device flow and the snippet runner.
//!
//! Presentation layers implement [`PlaygroundEvents`] (or drain a [`ChannelEvents`] receiver)
//! instead of the state machine touching any particular UI.

// crates.io
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
// self
use crate::{
	_prelude::*,
	flows::{FlowState, UserCodePrompt},
	sandbox::OutputLine,
};

/// Callback surface consumed by a presentation layer. Every hook defaults to a no-op.
pub trait PlaygroundEvents
where
	Self: Send + Sync,
{
	/// The device flow moved to `state`.
	fn on_state_changed(&self, state: FlowState) {
		let _ = state;
	}

	/// The provider issued a user code that must be shown to the user.
	fn on_code_received(&self, prompt: &UserCodePrompt) {
		let _ = prompt;
	}

	/// A snippet run started; previous output must be discarded.
	fn on_output_cleared(&self) {}

	/// A snippet produced an output line.
	fn on_output_line(&self, line: &OutputLine) {
		let _ = line;
	}
}

/// Event sink that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEvents;
impl PlaygroundEvents for NoopEvents {}

/// Owned form of every [`PlaygroundEvents`] hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaygroundEvent {
	/// See [`PlaygroundEvents::on_state_changed`].
	StateChanged(FlowState),
	/// See [`PlaygroundEvents::on_code_received`].
	CodeReceived(UserCodePrompt),
	/// See [`PlaygroundEvents::on_output_cleared`].
	OutputCleared,
	/// See [`PlaygroundEvents::on_output_line`].
	OutputLine(OutputLine),
}

/// Forwards every hook into an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelEvents(UnboundedSender<PlaygroundEvent>);
impl ChannelEvents {
	/// Creates the sink together with the receiver a presentation task drains.
	pub fn new() -> (Self, UnboundedReceiver<PlaygroundEvent>) {
		let (tx, rx) = mpsc::unbounded_channel();

		(Self(tx), rx)
	}

	fn send(&self, event: PlaygroundEvent) {
		// A dropped receiver means nobody is rendering anymore.
		let _ = self.0.send(event);
	}
}
impl PlaygroundEvents for ChannelEvents {
	fn on_state_changed(&self, state: FlowState) {
		self.send(PlaygroundEvent::StateChanged(state));
	}

	fn on_code_received(&self, prompt: &UserCodePrompt) {
		self.send(PlaygroundEvent::CodeReceived(prompt.clone()));
	}

	fn on_output_cleared(&self) {
		self.send(PlaygroundEvent::OutputCleared);
	}

	fn on_output_line(&self, line: &OutputLine) {
		self.send(PlaygroundEvent::OutputLine(line.clone()));
	}
}

/// Buffers every event in memory; handy for snapshots and tests.
#[derive(Debug, Default)]
pub struct RecordingEvents(Mutex<Vec<PlaygroundEvent>>);
impl RecordingEvents {
	/// Returns a copy of every event seen so far.
	pub fn events(&self) -> Vec<PlaygroundEvent> {
		self.0.lock().clone()
	}

	/// Returns only the state transitions, in order.
	pub fn states(&self) -> Vec<FlowState> {
		self.0
			.lock()
			.iter()
			.filter_map(|event| match event {
				PlaygroundEvent::StateChanged(state) => Some(*state),
				_ => None,
			})
			.collect()
	}
}
impl PlaygroundEvents for RecordingEvents {
	fn on_state_changed(&self, state: FlowState) {
		self.0.lock().push(PlaygroundEvent::StateChanged(state));
	}

	fn on_code_received(&self, prompt: &UserCodePrompt) {
		self.0.lock().push(PlaygroundEvent::CodeReceived(prompt.clone()));
	}

	fn on_output_cleared(&self) {
		self.0.lock().push(PlaygroundEvent::OutputCleared);
	}

	fn on_output_line(&self, line: &OutputLine) {
		self.0.lock().push(PlaygroundEvent::OutputLine(line.clone()));
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn channel_events_forward_in_order() {
		let (events, mut rx) = ChannelEvents::new();

		events.on_state_changed(FlowState::Requesting);
		events.on_output_cleared();

		assert_eq!(rx.try_recv().ok(), Some(PlaygroundEvent::StateChanged(FlowState::Requesting)));
		assert_eq!(rx.try_recv().ok(), Some(PlaygroundEvent::OutputCleared));
	}

	#[test]
	fn closed_channel_is_ignored() {
		let (events, rx) = ChannelEvents::new();

		drop(rx);
		events.on_state_changed(FlowState::Failed);
	}
}
