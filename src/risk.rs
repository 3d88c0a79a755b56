//! Transition risk policy for consecutive wheel motions
//!
//! Reversing direction or switching between translation and rotation without
//! settling time jerks a differential-drive base. The executor inserts an
//! interlock pause before any transition this module reports as risky.

use crate::block::WheelMotion;

/// Motion axis of a wheel primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Linear,
    Angular,
}

impl WheelMotion {
    pub fn axis(self) -> Axis {
        match self {
            WheelMotion::MoveForward | WheelMotion::MoveBackward => Axis::Linear,
            WheelMotion::TurnLeft | WheelMotion::TurnRight => Axis::Angular,
        }
    }

    /// The same-axis motion in the opposite direction
    pub fn reverse(self) -> Self {
        match self {
            WheelMotion::MoveForward => WheelMotion::MoveBackward,
            WheelMotion::MoveBackward => WheelMotion::MoveForward,
            WheelMotion::TurnLeft => WheelMotion::TurnRight,
            WheelMotion::TurnRight => WheelMotion::TurnLeft,
        }
    }
}

/// Whether `current` needs an interlock after `previous`
pub fn is_risky(previous: Option<WheelMotion>, current: WheelMotion) -> bool {
    let Some(previous) = previous else {
        return false;
    };
    let reversal = previous.reverse() == current;
    let axis_switch = previous.axis() != current.axis();
    reversal || axis_switch
}

#[cfg(test)]
mod tests {
    use super::*;
    use WheelMotion::*;

    #[test]
    fn test_first_motion_never_risky() {
        for motion in WheelMotion::ALL {
            assert!(!is_risky(None, motion));
        }
    }

    #[test]
    fn test_full_transition_table() {
        let table = [
            (MoveForward, MoveForward, false),
            (MoveForward, MoveBackward, true),
            (MoveForward, TurnLeft, true),
            (MoveForward, TurnRight, true),
            (MoveBackward, MoveForward, true),
            (MoveBackward, MoveBackward, false),
            (MoveBackward, TurnLeft, true),
            (MoveBackward, TurnRight, true),
            (TurnLeft, MoveForward, true),
            (TurnLeft, MoveBackward, true),
            (TurnLeft, TurnLeft, false),
            (TurnLeft, TurnRight, true),
            (TurnRight, MoveForward, true),
            (TurnRight, MoveBackward, true),
            (TurnRight, TurnLeft, true),
            (TurnRight, TurnRight, false),
        ];
        for (previous, current, expected) in table {
            assert_eq!(
                is_risky(Some(previous), current),
                expected,
                "{} -> {}",
                previous,
                current
            );
        }
    }
}
