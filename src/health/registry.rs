//! Dependency registry.
//!
//! # Responsibilities
//! - Hold the configured dependencies in registration order
//! - Create each dependency's circuit breaker alongside its descriptor
//!
//! # Design Decisions
//! - Mutated only during startup, then shared behind `Arc` without a lock
//! - Re-registering a name replaces the prior entry in place (last write wins)
//! - Descriptors are validated at registration, so bad config fails fast

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::validation::ValidationError;
use crate::health::probe::DependencyDescriptor;
use crate::resilience::circuit_breaker::{BreakerSettings, CircuitBreaker};
use crate::resilience::clock::SharedClock;

/// A registered dependency and its breaker.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub descriptor: Arc<DependencyDescriptor>,
    pub breaker: Arc<CircuitBreaker>,
}

impl Dependency {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

#[derive(Debug)]
pub struct DependencyRegistry {
    defaults: BreakerSettings,
    clock: SharedClock,
    entries: Vec<Dependency>,
    index: HashMap<String, usize>,
}

impl DependencyRegistry {
    pub fn new(defaults: BreakerSettings, clock: SharedClock) -> Self {
        Self {
            defaults,
            clock,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register (or replace) a dependency.
    pub fn register(&mut self, descriptor: DependencyDescriptor) -> Result<(), Vec<ValidationError>> {
        descriptor.validate()?;

        let settings = BreakerSettings {
            failure_threshold: descriptor
                .breaker
                .failure_threshold
                .unwrap_or(self.defaults.failure_threshold),
            recovery_timeout: descriptor
                .breaker
                .recovery_timeout
                .unwrap_or(self.defaults.recovery_timeout),
            ..self.defaults
        };
        let breaker = Arc::new(CircuitBreaker::new(
            descriptor.name.clone(),
            settings,
            self.clock.clone(),
        ));
        let name = descriptor.name.clone();
        let entry = Dependency {
            descriptor: Arc::new(descriptor),
            breaker,
        };

        match self.index.get(&name) {
            Some(&position) => {
                tracing::warn!(dependency = %name, "Dependency re-registered, replacing previous descriptor");
                self.entries[position] = entry;
            }
            None => {
                tracing::debug!(dependency = %name, kind = entry.descriptor.kind.label(), "Dependency registered");
                self.index.insert(name, self.entries.len());
                self.entries.push(entry);
            }
        }
        Ok(())
    }

    /// All dependencies in registration order.
    pub fn all(&self) -> &[Dependency] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&Dependency> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }
}
