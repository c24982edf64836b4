// This file is part of Relayer.
//
// Relayer is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Relayer is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Relayer.
// If not, see https://www.gnu.org/licenses/.

//! Utilities for emitting and collecting events from runtime components

use std::fmt::Display;

use alloy_primitives::Address;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{info, warn};

/// Capacity of the event channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// An event tagged with the entry point it is associated with.
#[derive(Clone, Debug)]
pub struct WithEntryPoint<T> {
    /// Entry point address associated with the event
    pub entry_point: Address,
    /// The event itself
    pub event: T,
}

impl<T> WithEntryPoint<T> {
    /// Convert one `WithEntryPoint` type event to another
    pub fn of<U: Into<T>>(value: WithEntryPoint<U>) -> Self {
        Self {
            entry_point: value.entry_point,
            event: value.event.into(),
        }
    }
}

impl<T: Display> Display for WithEntryPoint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}    Entrypoint: {:?}", self.event, self.entry_point)
    }
}

/// Sending half of an event channel bound to a single entry point.
///
/// Sending never fails: when nobody is listening the event is dropped.
#[derive(Clone, Debug)]
pub struct EventEmitter<T> {
    entry_point: Address,
    sender: broadcast::Sender<WithEntryPoint<T>>,
}

impl<T> EventEmitter<T> {
    /// Create an emitter that tags every event with `entry_point`
    pub fn new(entry_point: Address, sender: broadcast::Sender<WithEntryPoint<T>>) -> Self {
        Self {
            entry_point,
            sender,
        }
    }

    /// Emit an event to all current subscribers
    pub fn emit(&self, event: T) {
        let _ = self.sender.send(WithEntryPoint {
            entry_point: self.entry_point,
            event,
        });
    }

    /// Subscribe to the events sent through this emitter
    pub fn subscribe(&self) -> broadcast::Receiver<WithEntryPoint<T>> {
        self.sender.subscribe()
    }
}

/// Receive events from a event broadcast channel and call
/// the given handler function for each event.
pub fn receive_events<T>(
    description: &'static str,
    mut rx: broadcast::Receiver<T>,
    handler: impl Fn(T) + Send + 'static,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => handler(event),
                Err(RecvError::Closed) => {
                    info!("Event stream for {description} closed. Logging complete");
                    break;
                }
                Err(RecvError::Lagged(count)) => {
                    warn!("Event stream for {description} lagged. Missed {count} messages.")
                }
            }
        }
    })
}

/// An event handler that logs every event passing `filter` at INFO level.
pub fn receive_and_log_events_with_filter<T>(
    rx: broadcast::Receiver<T>,
    filter: impl (Fn(&T) -> bool) + Send + 'static,
) -> JoinHandle<()>
where
    T: Clone + Display + Send + 'static,
{
    receive_events("logging", rx, move |event| {
        if filter(&event) {
            info!("{}", event);
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[test]
    fn emit_without_subscribers_is_dropped() {
        let (tx, rx) = broadcast::channel::<WithEntryPoint<u32>>(4);
        drop(rx);
        let emitter = EventEmitter::new(Address::ZERO, tx);
        emitter.emit(1);
    }

    #[tokio::test]
    async fn receive_events_calls_handler() {
        let (tx, rx) = broadcast::channel::<WithEntryPoint<u32>>(4);
        let entry_point = Address::repeat_byte(1);
        let emitter = EventEmitter::new(entry_point, tx);

        let seen = Arc::new(AtomicUsize::new(0));
        let handle = receive_events("test", rx, {
            let seen = Arc::clone(&seen);
            move |event: WithEntryPoint<u32>| {
                assert_eq!(event.entry_point, entry_point);
                seen.fetch_add(event.event as usize, Ordering::SeqCst);
            }
        });

        emitter.emit(2);
        emitter.emit(3);
        drop(emitter);
        handle.await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }
}
