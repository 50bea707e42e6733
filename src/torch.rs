//! Torch capability probing and switching.
//!
//! Probing inspects each track's advertised capability set once and
//! short-circuits on the first compatible track. A probe failure is treated
//! as "incompatible", never as fatal.
//!
//! Turning the torch off applies the off constraint and then requires a
//! full session restart: the design cannot otherwise confirm the disable
//! succeeded without re-negotiating the stream. Known limitation, kept.

use std::sync::Arc;

use crate::platform::{MediaStream, TorchConstraint};
use crate::stream::video_tracks;
use crate::TorchAvailability;

/// Result of a torch switch request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TorchSwitch {
    /// Availability unknown or unavailable: the request was a no-op.
    Skipped,
    /// Torch constraint applied; nothing else to do.
    Applied,
    /// Off constraint applied; the caller must restart the session.
    RestartRequired,
}

/// Determine torch availability for a freshly acquired stream.
pub fn probe(stream: &Arc<dyn MediaStream>) -> TorchAvailability {
    for track in video_tracks(stream) {
        match track.capabilities() {
            Ok(caps) if caps.torch || !caps.fill_light_modes.is_empty() => {
                log::debug!("track {} is torch compatible", track.id());
                return TorchAvailability::Available;
            }
            Ok(_) => {}
            Err(err) => {
                log::debug!(
                    "capability query failed on track {}, treating as incompatible: {:#}",
                    track.id(),
                    err
                );
            }
        }
    }
    TorchAvailability::Unavailable
}

/// Switch the torch on or off across all tracks of the stream.
///
/// No-op unless availability is `Available`. Per-track constraint failures
/// are swallowed; torch control is best effort.
pub fn set_torch(
    stream: &Arc<dyn MediaStream>,
    availability: TorchAvailability,
    on: bool,
) -> TorchSwitch {
    if availability != TorchAvailability::Available {
        log::debug!("torch switch ignored, availability is {:?}", availability);
        return TorchSwitch::Skipped;
    }

    let constraint = if on {
        TorchConstraint::on()
    } else {
        TorchConstraint::off()
    };
    for track in video_tracks(stream) {
        if let Err(err) = track.apply_advanced(&constraint) {
            log::warn!("torch constraint failed on track {}: {:#}", track.id(), err);
        }
    }

    if on {
        TorchSwitch::Applied
    } else {
        TorchSwitch::RestartRequired
    }
}
