use chrono::{DateTime, Utc};
use serde::Serialize;

/// Position reported by the controller when it does not know where the motor is
const UNKNOWN_POSITION: &str = "255";
const MAX_POSITION: u8 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    #[default]
    Idle,
    Opening,
    Closing,
}

impl Motion {
    pub fn from_sta(sta: &str) -> Self {
        match sta {
            "02" => Motion::Opening,
            "03" => Motion::Closing,
            _ => Motion::Idle,
        }
    }
}

/// Status of a single device as reported in the device list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub sta: String,
    pub pos: String,
    pub inp: String,
    pub installed: bool,
}

impl DeviceStatus {
    pub fn motion(&self) -> Motion {
        Motion::from_sta(&self.sta)
    }

    /// 0 is closed, 100 is open. `None` for 255 or anything else outside 0..=100.
    pub fn position(&self) -> Option<u8> {
        if self.pos == UNKNOWN_POSITION {
            return None;
        }
        self.pos
            .trim()
            .parse()
            .ok()
            .filter(|position| *position <= MAX_POSITION)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoverState {
    pub position: Option<u8>,
    pub motion: Motion,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CoverState {
    pub fn is_opening(&self) -> bool {
        self.motion == Motion::Opening
    }

    pub fn is_closing(&self) -> bool {
        self.motion == Motion::Closing
    }

    pub fn is_closed(&self) -> bool {
        self.position == Some(0)
    }

    /// Last known position only moves forward when the controller knows it
    pub fn apply(&mut self, status: &DeviceStatus) {
        if let Some(position) = status.position() {
            self.position = Some(position);
        }
        self.motion = status.motion();
        self.updated_at = Some(Utc::now());
    }

    pub fn label(&self) -> &'static str {
        match self.motion {
            Motion::Opening => "opening",
            Motion::Closing => "closing",
            Motion::Idle => match self.position {
                Some(0) => "closed",
                Some(_) => "open",
                None => "stopped",
            },
        }
    }
}

/// Combine member states the way a group of blinds is presented
pub fn aggregate<'a>(states: impl IntoIterator<Item = &'a CoverState>) -> CoverState {
    let mut positions = vec![];
    let mut opening = false;
    let mut closing = false;
    let mut updated_at: Option<DateTime<Utc>> = None;

    for state in states {
        if let Some(position) = state.position {
            positions.push(position as u32);
        }
        opening |= state.is_opening();
        closing |= state.is_closing();
        updated_at = updated_at.max(state.updated_at);
    }

    let position = if positions.is_empty() {
        None
    } else {
        Some((positions.iter().sum::<u32>() / positions.len() as u32) as u8)
    };

    let motion = if opening {
        Motion::Opening
    } else if closing {
        Motion::Closing
    } else {
        Motion::Idle
    };

    CoverState {
        position,
        motion,
        updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(sta: &str, pos: &str) -> DeviceStatus {
        DeviceStatus {
            sta: sta.to_owned(),
            pos: pos.to_owned(),
            inp: "0".to_owned(),
            installed: true,
        }
    }

    #[test]
    fn unknown_position_keeps_last_known() {
        let mut state = CoverState::default();
        state.apply(&status("00", "40"));
        assert_eq!(state.position, Some(40));

        state.apply(&status("02", "255"));
        assert_eq!(state.position, Some(40));
        assert!(state.is_opening());
    }

    #[test]
    fn out_of_range_positions_are_unknown() {
        assert_eq!(status("00", "0").position(), Some(0));
        assert_eq!(status("00", "100").position(), Some(100));
        assert_eq!(status("00", "101").position(), None);
        assert_eq!(status("00", "254").position(), None);
        assert_eq!(status("00", "-1").position(), None);

        let mut state = CoverState::default();
        state.apply(&status("00", "60"));
        state.apply(&status("00", "180"));
        assert_eq!(state.position, Some(60));
    }

    #[test]
    fn sta_codes() {
        assert_eq!(Motion::from_sta("02"), Motion::Opening);
        assert_eq!(Motion::from_sta("03"), Motion::Closing);
        assert_eq!(Motion::from_sta("00"), Motion::Idle);
        assert_eq!(Motion::from_sta("04"), Motion::Idle);
    }

    #[test]
    fn labels() {
        let mut state = CoverState::default();
        assert_eq!(state.label(), "stopped");
        state.position = Some(0);
        assert_eq!(state.label(), "closed");
        assert!(state.is_closed());
        state.position = Some(55);
        assert_eq!(state.label(), "open");
        state.motion = Motion::Closing;
        assert_eq!(state.label(), "closing");
    }

    #[test]
    fn aggregate_averages_known_positions() {
        let states = [
            CoverState {
                position: Some(100),
                ..Default::default()
            },
            CoverState {
                position: Some(25),
                motion: Motion::Closing,
                ..Default::default()
            },
            CoverState::default(),
        ];
        let group = aggregate(&states);
        assert_eq!(group.position, Some(62));
        assert!(group.is_closing());
    }

    #[test]
    fn aggregate_without_positions_is_unknown() {
        let group = aggregate(&[CoverState::default(), CoverState::default()]);
        assert_eq!(group.position, None);
        assert!(!group.is_closed());
    }
}
