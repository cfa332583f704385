use crate::collector::MetricCollector;
use crate::http::HttpClient;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::Arc;

/// Everything a step can see while one VU runs one iteration.
///
/// `shared` is the read-only output of the setup phase. `state` belongs to the current iteration
/// and is reset to `S::default()` before each one starts.
pub struct VuContext<D, S> {
    pub vu: u64,
    pub iteration: u64,
    pub profile: String,
    pub state: S,
    pub rng: SmallRng,
    shared: Arc<D>,
    client: Arc<dyn HttpClient>,
    collector: MetricCollector,
}

impl<D, S: Default> VuContext<D, S> {
    pub fn new(
        vu: u64,
        profile: &str,
        shared: Arc<D>,
        client: Arc<dyn HttpClient>,
        collector: MetricCollector,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(vu)),
            None => SmallRng::from_entropy(),
        };

        Self {
            vu,
            iteration: 0,
            profile: profile.to_string(),
            state: S::default(),
            rng,
            shared,
            client,
            collector,
        }
    }
}

impl<D, S> VuContext<D, S> {
    pub fn shared(&self) -> &D {
        &self.shared
    }

    pub fn collector(&self) -> &MetricCollector {
        &self.collector
    }

    /// A handle to the transport that does not borrow the context.
    pub fn client(&self) -> Arc<dyn HttpClient> {
        self.client.clone()
    }
}
