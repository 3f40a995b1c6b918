use serde::Deserialize;

/// How aggressively a sample is searched for observations: the marine date
/// window half-width and the route fractions probed, in priority order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FetchProfile {
    pub half_window_days: u32,
    pub fractions: Vec<f64>,
}

impl FetchProfile {
    pub fn new(half_window_days: u32, fractions: Vec<f64>) -> Self {
        Self {
            half_window_days,
            fractions,
        }
    }

    pub fn point_count(&self) -> usize {
        self.fractions.len()
    }

    /// Width of the marine query range in days (`2w + 1`).
    pub fn window_span_days(&self) -> u32 {
        self.half_window_days * 2 + 1
    }
}

/// Ordered escalation schedule, cheapest profile first.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationSchedule {
    profiles: Vec<FetchProfile>,
}

impl EscalationSchedule {
    pub fn new(profiles: Vec<FetchProfile>) -> Self {
        Self { profiles }
    }

    /// Every window crossed with every fraction set, fraction sets outermost.
    pub fn cross(windows: &[u32], fraction_sets: &[Vec<f64>]) -> Self {
        let profiles = fraction_sets
            .iter()
            .flat_map(|fractions| {
                windows
                    .iter()
                    .map(move |&window| FetchProfile::new(window, fractions.clone()))
            })
            .collect();
        Self { profiles }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FetchProfile> {
        self.profiles.iter()
    }
}
