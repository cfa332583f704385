use crate::step::Step;

/// A fixed, ordered list of steps making up one user journey.
pub struct Scenario<D, S> {
    name: String,
    steps: Vec<Box<dyn Step<D, S>>>,
}

impl<D, S> Scenario<D, S> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: vec![],
        }
    }

    pub fn step(mut self, step: impl Step<D, S> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Box<dyn Step<D, S>>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<D, S> std::fmt::Debug for Scenario<D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field(
                "steps",
                &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
