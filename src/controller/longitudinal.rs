use super::EmergencyCause;
use crate::attributes::AttributeProfile;
use crate::perception::Neighbour;

/// The share of the preferred following gap which aggressive,
/// risk-tolerant drivers are willing to give up.
const GAP_RELAXATION: f64 = 0.5;

/// Distance kept to a stopped leader on top of the tailgate distance, in m.
const STANDSTILL_MARGIN: f64 = 1.0; // m

/// Jerk limit of the least experienced drivers, in m/s<sup>3</sup>.
const MAX_JERK: f64 = 20.0;

/// Jerk limit of the most experienced drivers, in m/s<sup>3</sup>.
const MIN_JERK: f64 = 2.0;

/// Fraction of the maximum deceleration used to approach a stop line.
const STOP_COMFORT: f64 = 0.5;

/// How far short of a stop line vehicles aim to come to rest, in m.
pub(crate) const STOP_BUFFER: f64 = 0.5; // m

/// The car following model of a vehicle.
///
/// Each constraint (speed limit, leader, stop line) narrows the acceleration
/// the vehicle may use this tick. Comfort constraints are smoothed by a jerk
/// limit; safety constraints and emergency stops are applied unsmoothed.
#[derive(Clone, Debug)]
pub struct LongitudinalController {
    max_speed: f64,
    max_acc: f64,
    max_dec: f64,
    tailgate: f64,
    headway: f64,
    relaxation: f64,
    reaction: f64,
    jerk: f64,
    vel: f64,
    dt: f64,
    /// Upper bound from comfort constraints.
    comfort_acc: f64,
    /// Upper bound from safety constraints.
    safe_acc: f64,
    emergency: Option<EmergencyCause>,
}

impl LongitudinalController {
    /// Creates the model for a vehicle travelling at `vel` for a tick of `dt` seconds.
    pub fn new(profile: &AttributeProfile, vel: f64, dt: f64) -> Self {
        Self {
            max_speed: profile.max_speed(),
            max_acc: profile.acceleration(),
            max_dec: profile.deceleration(),
            tailgate: profile.tailgate_distance(),
            headway: profile.following_distance(),
            relaxation: profile.gap_relaxation(),
            reaction: profile.reaction_time(),
            jerk: MAX_JERK - (MAX_JERK - MIN_JERK) * profile.experience(),
            vel,
            dt,
            comfort_acc: profile.acceleration(),
            safe_acc: f64::INFINITY,
            emergency: None,
        }
    }

    /// Accelerates smoothly towards the lesser of the preferred maximum speed
    /// and the speed limit (m/s).
    pub fn apply_speed_limit(&mut self, speed_limit: f64) {
        let desired = f64::min(self.max_speed, speed_limit);
        let this_acc = self.max_acc * ((desired - self.vel) / desired).clamp(-1.0, 1.0);
        self.comfort_acc = f64::min(self.comfort_acc, this_acc);
    }

    /// Applies the car following model for the vehicle ahead.
    ///
    /// Keeps a preferred gap of `following_distance` seconds, shrunk by
    /// aggression and risk tolerance down to the tailgate distance, and never
    /// travels faster than would let it stop behind the leader should the
    /// leader brake as hard as it can.
    pub fn follow_vehicle(&mut self, leader: &Neighbour) {
        let gap = leader.gap;
        if gap <= 0.0 {
            return self.emergency_stop(EmergencyCause::Overlap);
        }
        if gap < self.tailgate {
            return self.emergency_stop(EmergencyCause::Tailgating);
        }

        // Proportional braking when closer than the preferred gap
        let relaxed = self.headway * self.vel * (1.0 - GAP_RELAXATION * self.relaxation);
        let desired_gap = f64::max(self.tailgate, relaxed);
        if gap < desired_gap {
            let span = f64::max(desired_gap - self.tailgate, f64::EPSILON);
            let shortfall = ((desired_gap - gap) / span).clamp(0.0, 1.0);
            self.comfort_acc = f64::min(self.comfort_acc, -self.max_dec * shortfall);
        }

        // Safe following bound
        let leader_stop = leader.vel.powi(2) / (2.0 * leader.max_dec);
        let room = gap - self.tailgate - STANDSTILL_MARGIN + leader_stop;
        self.limit_speed(self.safe_speed(room));
    }

    /// Brings the vehicle to rest just before a stop line, or slows it to
    /// `crawl_speed` (m/s) as it reaches the line.
    ///
    /// # Arguments
    /// * `net_dist` - The distance between the front of the vehicle and the stop line.
    /// * `crawl_speed` - The speed at which to cross the line, zero for a full stop.
    pub fn stop_at_line(&mut self, net_dist: f64, crawl_speed: f64) {
        let room = f64::max(net_dist - STOP_BUFFER, 0.0);
        let comf_dec = STOP_COMFORT * self.max_dec;
        let allowed = (crawl_speed.powi(2) + 2.0 * comf_dec * room).sqrt();
        self.limit_speed(allowed);
    }

    /// Applies the maximum deceleration to the vehicle.
    pub fn emergency_stop(&mut self, cause: EmergencyCause) {
        self.emergency.get_or_insert(cause);
    }

    /// Calculates the final acceleration, given the acceleration used during the
    /// previous tick. Always within `[-deceleration, acceleration]`.
    pub fn finish(self, prev_acc: f64) -> (f64, Option<EmergencyCause>) {
        if let Some(cause) = self.emergency {
            return (-self.max_dec, Some(cause));
        }
        let step = self.jerk * self.dt;
        let acc = self.comfort_acc.clamp(prev_acc - step, prev_acc + step);
        let acc = f64::min(acc, self.safe_acc);
        if acc.is_nan() {
            return (-self.max_dec, Some(EmergencyCause::ControllerFault));
        }
        (acc.clamp(-self.max_dec, self.max_acc), None)
    }

    /// Prevents the vehicle exceeding `max_vel` by the end of the tick.
    fn limit_speed(&mut self, max_vel: f64) {
        let this_acc = (max_vel - self.vel) / self.dt;
        self.safe_acc = f64::min(self.safe_acc, this_acc);
    }

    /// The highest speed from which the vehicle can react and then stop within `dist` metres.
    fn safe_speed(&self, dist: f64) -> f64 {
        if dist <= 0.0 {
            return 0.0;
        }
        let b = self.max_dec;
        let tr = f64::max(self.reaction, self.dt);
        b * (-tr + (tr * tr + 2.0 * dist / b).sqrt())
    }
}

/// The distance needed to stop from `vel` m/s braking at `dec` m/s<sup>2</sup>.
pub fn stopping_distance(vel: f64, dec: f64) -> f64 {
    vel.powi(2) / (2.0 * dec)
}
