use glam::{Quat, Vec3};
use openxr as xr;

/// How often the headset pose is queried. A single query after the session
/// is attached is enough to switch the headset to direct output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingPolicy {
    Once,
    #[default]
    EveryFrame,
}

impl TrackingPolicy {
    pub fn should_query(self, queries_so_far: u64) -> bool {
        match self {
            TrackingPolicy::Once => queries_so_far == 0,
            TrackingPolicy::EveryFrame => true,
        }
    }
}

/// Headset pose relative to the local reference space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingState {
    pub position: Vec3,
    pub orientation: Quat,
    pub position_valid: bool,
    pub orientation_valid: bool,
    pub position_tracked: bool,
    pub orientation_tracked: bool,
}

impl TrackingState {
    pub fn from_pose(flags: xr::SpaceLocationFlags, pose: xr::Posef) -> Self {
        let orientation_valid = flags.contains(xr::SpaceLocationFlags::ORIENTATION_VALID);
        let position_valid = flags.contains(xr::SpaceLocationFlags::POSITION_VALID);

        // Runtimes may leave garbage in fields they did not mark valid
        let orientation = if orientation_valid {
            let o = pose.orientation;
            Quat::from_xyzw(o.x, o.y, o.z, o.w).normalize()
        } else {
            Quat::IDENTITY
        };
        let position = if position_valid {
            let p = pose.position;
            Vec3::new(p.x, p.y, p.z)
        } else {
            Vec3::ZERO
        };

        Self {
            position,
            orientation,
            position_valid,
            orientation_valid,
            position_tracked: flags.contains(xr::SpaceLocationFlags::POSITION_TRACKED),
            orientation_tracked: flags.contains(xr::SpaceLocationFlags::ORIENTATION_TRACKED),
        }
    }

    /// True when the runtime is actively tracking the headset's orientation.
    pub fn is_tracked(&self) -> bool {
        self.orientation_valid && self.orientation_tracked
    }

    /// Where the headset is looking, in local space.
    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }
}

impl From<xr::SpaceLocation> for TrackingState {
    fn from(location: xr::SpaceLocation) -> Self {
        Self::from_pose(location.location_flags, location.pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pose(position: [f32; 3], orientation: [f32; 4]) -> xr::Posef {
        xr::Posef {
            orientation: xr::Quaternionf {
                x: orientation[0],
                y: orientation[1],
                z: orientation[2],
                w: orientation[3],
            },
            position: xr::Vector3f {
                x: position[0],
                y: position[1],
                z: position[2],
            },
        }
    }

    #[test]
    fn test_policy_once_queries_first_frame_only() {
        assert!(TrackingPolicy::Once.should_query(0));
        assert!(!TrackingPolicy::Once.should_query(1));
        assert!(!TrackingPolicy::Once.should_query(500));
    }

    #[test]
    fn test_policy_every_frame() {
        assert!(TrackingPolicy::EveryFrame.should_query(0));
        assert!(TrackingPolicy::EveryFrame.should_query(1000));
        assert_eq!(TrackingPolicy::default(), TrackingPolicy::EveryFrame);
    }

    #[test]
    fn test_fully_tracked_pose() {
        let flags = xr::SpaceLocationFlags::ORIENTATION_VALID
            | xr::SpaceLocationFlags::POSITION_VALID
            | xr::SpaceLocationFlags::ORIENTATION_TRACKED
            | xr::SpaceLocationFlags::POSITION_TRACKED;
        let half = std::f32::consts::FRAC_1_SQRT_2;
        // 90 degrees about +Y
        let state = TrackingState::from_pose(flags, pose([0.1, 1.7, -0.2], [0.0, half, 0.0, half]));

        assert!(state.is_tracked());
        assert!(state.position_valid && state.position_tracked);
        assert_relative_eq!(state.position.y, 1.7);
        let forward = state.forward();
        assert_relative_eq!(forward.x, -1.0, epsilon = 1e-5);
        assert_relative_eq!(forward.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_invalid_fields_are_ignored() {
        let state = TrackingState::from_pose(
            xr::SpaceLocationFlags::EMPTY,
            pose([f32::NAN, 0.0, 0.0], [0.0, 0.0, 0.0, 0.0]),
        );
        assert!(!state.is_tracked());
        assert_eq!(state.position, Vec3::ZERO);
        assert_eq!(state.orientation, Quat::IDENTITY);
    }

    #[test]
    fn test_orientation_only_headset() {
        let flags = xr::SpaceLocationFlags::ORIENTATION_VALID | xr::SpaceLocationFlags::ORIENTATION_TRACKED;
        let state = TrackingState::from_pose(flags, pose([5.0, 5.0, 5.0], [0.0, 0.0, 0.0, 2.0]));
        assert!(state.is_tracked());
        assert!(!state.position_valid);
        assert_eq!(state.position, Vec3::ZERO);
        assert_relative_eq!(state.orientation.w, 1.0);
        assert_relative_eq!(state.forward().z, -1.0);
    }
}
