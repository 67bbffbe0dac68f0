use bevy::prelude::*;

/// Process-local gameplay clock in seconds.
///
/// Every cooldown end, request deadline and bootstrap retry is expressed on
/// this clock. Server and clients each run their own; timestamps are never sent
/// over the wire, only durations are derived from them.
#[derive(Resource, Clone, Copy, Debug, Default, PartialEq)]
pub struct AbilityClock {
    pub now: f64,
}

impl AbilityClock {
    pub fn at(now: f64) -> Self {
        Self { now }
    }

    pub fn advance(&mut self, seconds: f64) {
        self.now += seconds.max(0.0);
    }
}

/// Drives [`AbilityClock`] from real time. Binaries add this; tests leave it out
/// and move the clock by hand.
pub struct AbilityClockPlugin;

impl Plugin for AbilityClockPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<AbilityClock>();
        app.add_systems(First, advance_ability_clock);
    }
}

fn advance_ability_clock(time: Res<Time<Real>>, mut clock: ResMut<AbilityClock>) {
    clock.advance(time.delta_secs_f64());
}
