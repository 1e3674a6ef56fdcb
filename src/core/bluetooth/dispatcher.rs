//! Serialised command dispatch
//!
//! Colour and brightness are independent channels. Each channel holds at
//! most one queued frame; a newer frame on the same channel replaces the
//! queued one. Exactly one write is in flight across both channels, and
//! when it completes the older of the queued frames goes next.

use log::debug;

use crate::core::bluetooth::commands::{Channel, Frame};

/// A frame waiting for, or undergoing, transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub channel: Channel,
    pub frame: Frame,
    /// Submission order, used to pick the older queued frame
    seq: u64,
}

impl PendingWrite {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Queue state for the active connection
#[derive(Debug, Default)]
pub struct CommandDispatcher {
    in_flight: Option<PendingWrite>,
    color: Option<PendingWrite>,
    brightness: Option<PendingWrite>,
    next_seq: u64,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a frame. Returns the write to start now when the dispatcher
    /// was idle.
    pub fn submit(&mut self, channel: Channel, frame: Frame) -> Option<PendingWrite> {
        let write = PendingWrite {
            channel,
            frame,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        if self.in_flight.is_none() {
            self.in_flight = Some(write.clone());
            return Some(write);
        }

        if let Some(superseded) = self.slot_mut(channel).replace(write) {
            debug!("Superseded queued {:?} frame {:?}", channel, superseded.frame);
        }
        None
    }

    /// Marks the in-flight write as finished and returns the next one to
    /// start, if any.
    pub fn complete(&mut self) -> Option<PendingWrite> {
        self.in_flight = None;

        let next_channel = match (&self.color, &self.brightness) {
            (Some(c), Some(b)) => Some(if c.seq < b.seq {
                Channel::Color
            } else {
                Channel::Brightness
            }),
            (Some(_), None) => Some(Channel::Color),
            (None, Some(_)) => Some(Channel::Brightness),
            (None, None) => None,
        }?;

        let next = self.slot_mut(next_channel).take()?;
        self.in_flight = Some(next.clone());
        Some(next)
    }

    /// Discards everything queued or in flight. Returns how many frames
    /// were dropped.
    pub fn clear(&mut self) -> usize {
        [
            self.in_flight.take(),
            self.color.take(),
            self.brightness.take(),
        ]
        .into_iter()
        .flatten()
        .count()
    }

    pub fn in_flight(&self) -> Option<&PendingWrite> {
        self.in_flight.as_ref()
    }

    pub fn queued(&self, channel: Channel) -> Option<&PendingWrite> {
        match channel {
            Channel::Color => self.color.as_ref(),
            Channel::Brightness => self.brightness.as_ref(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.color.is_none() && self.brightness.is_none()
    }

    fn slot_mut(&mut self, channel: Channel) -> &mut Option<PendingWrite> {
        match channel {
            Channel::Color => &mut self.color,
            Channel::Brightness => &mut self.brightness,
        }
    }
}
