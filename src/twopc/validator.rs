//! Per-service validation (§4.2 step 1, §3 "validator" glossary entry).
//!
//! Generalizes the teacher's `SecurityValidator`/`SchemaValidator` trait
//! split in `auth.rs` and `schema.rs` into a single `Validator` trait keyed
//! by service name. Each built-in validator mirrors one of
//! `original_source/Ride_Sharing_System/two_phase_commit/participant.py`'s
//! `_can_commit` branches exactly: same required parameter, same commit
//! probability, same reason strings for both outcomes.

use rand::Rng;
use std::collections::HashMap;

/// Decides whether a proposed operation should be voted `COMMIT`, returning
/// the human-readable reason the original per-service validators always
/// carried alongside the vote.
pub trait Validator: Send + Sync {
    fn validate(&self, operation: &str, parameters: &HashMap<String, String>) -> (bool, String);
}

fn sample<R: Rng>(rng: &parking_lot::Mutex<R>, probability: f64) -> bool {
    rng.lock().gen_bool(probability)
}

/// `DriverService`: requires `driver_id`; commits ~85% of the time.
pub struct DriverServiceValidator<R> {
    rng: parking_lot::Mutex<R>,
}

impl<R: Rng + Send> DriverServiceValidator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng: parking_lot::Mutex::new(rng),
        }
    }
}

impl<R: Rng + Send> Validator for DriverServiceValidator<R> {
    fn validate(&self, _operation: &str, parameters: &HashMap<String, String>) -> (bool, String) {
        if parameters.get("driver_id").map_or(true, |v| v.is_empty()) {
            return (false, "No driver ID provided".to_string());
        }
        if sample(&self.rng, 0.85) {
            (true, "Driver available".to_string())
        } else {
            (false, "Driver not available".to_string())
        }
    }
}

/// `PaymentService`: requires a positive numeric `amount`; commits ~90%.
pub struct PaymentServiceValidator<R> {
    rng: parking_lot::Mutex<R>,
}

impl<R: Rng + Send> PaymentServiceValidator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng: parking_lot::Mutex::new(rng),
        }
    }
}

impl<R: Rng + Send> Validator for PaymentServiceValidator<R> {
    fn validate(&self, _operation: &str, parameters: &HashMap<String, String>) -> (bool, String) {
        let amount = parameters.get("amount").map(|s| s.as_str()).unwrap_or("0");
        match amount.parse::<f64>() {
            Ok(value) if value > 0.0 => {
                if sample(&self.rng, 0.90) {
                    (true, "Payment authorized".to_string())
                } else {
                    (false, "Insufficient funds".to_string())
                }
            }
            Ok(_) => (false, "Invalid amount".to_string()),
            Err(_) => (false, "Invalid amount format".to_string()),
        }
    }
}

/// `BookingService`: requires `rider_id`; commits ~95%.
pub struct BookingServiceValidator<R> {
    rng: parking_lot::Mutex<R>,
}

impl<R: Rng + Send> BookingServiceValidator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng: parking_lot::Mutex::new(rng),
        }
    }
}

impl<R: Rng + Send> Validator for BookingServiceValidator<R> {
    fn validate(&self, _operation: &str, parameters: &HashMap<String, String>) -> (bool, String) {
        if parameters.get("rider_id").map_or(true, |v| v.is_empty()) {
            return (false, "No rider ID provided".to_string());
        }
        if sample(&self.rng, 0.95) {
            (true, "Booking slot available".to_string())
        } else {
            (false, "Booking conflict".to_string())
        }
    }
}

/// `NotificationService`: no required parameters; commits ~98%.
pub struct NotificationServiceValidator<R> {
    rng: parking_lot::Mutex<R>,
}

impl<R: Rng + Send> NotificationServiceValidator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng: parking_lot::Mutex::new(rng),
        }
    }
}

impl<R: Rng + Send> Validator for NotificationServiceValidator<R> {
    fn validate(&self, _operation: &str, _parameters: &HashMap<String, String>) -> (bool, String) {
        if sample(&self.rng, 0.98) {
            (true, "Notification ready".to_string())
        } else {
            (false, "Notification service unavailable".to_string())
        }
    }
}

/// `AnalyticsService`: no required parameters; commits ~99%.
pub struct AnalyticsServiceValidator<R> {
    rng: parking_lot::Mutex<R>,
}

impl<R: Rng + Send> AnalyticsServiceValidator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng: parking_lot::Mutex::new(rng),
        }
    }
}

impl<R: Rng + Send> Validator for AnalyticsServiceValidator<R> {
    fn validate(&self, _operation: &str, _parameters: &HashMap<String, String>) -> (bool, String) {
        if sample(&self.rng, 0.99) {
            (true, "Analytics ready".to_string())
        } else {
            (false, "Analytics database unavailable".to_string())
        }
    }
}

/// Always votes `COMMIT`; used for services with no registered validator
/// and for deterministic tests.
pub struct AlwaysCommit;

impl Validator for AlwaysCommit {
    fn validate(&self, _operation: &str, _parameters: &HashMap<String, String>) -> (bool, String) {
        (true, "Ready to commit".to_string())
    }
}

/// Always votes `ABORT` with a fixed reason; used to force an abort outcome
/// in deterministic tests without depending on a probabilistic validator's
/// seed (§4.2: "implementations must inject the randomness source so tests
/// can force outcomes deterministically").
pub struct AlwaysAbort {
    pub reason: String,
}

impl AlwaysAbort {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl Validator for AlwaysAbort {
    fn validate(&self, _operation: &str, _parameters: &HashMap<String, String>) -> (bool, String) {
        (false, self.reason.clone())
    }
}

/// Maps a service name to the validator that should decide its votes.
/// Built once at participant startup from `SERVICE_NAME` (§9 config).
pub struct ValidatorRegistry {
    validators: HashMap<String, Box<dyn Validator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self {
            validators: HashMap::new(),
        }
    }

    pub fn register(&mut self, service_name: impl Into<String>, validator: Box<dyn Validator>) {
        self.validators.insert(service_name.into(), validator);
    }

    pub fn for_service(&self, service_name: &str) -> &dyn Validator {
        self.validators
            .get(service_name)
            .map(|v| v.as_ref())
            .unwrap_or(&AlwaysCommit)
    }

    /// Builds the registry with the fixed probabilities and reason strings
    /// the original distillation's five known services used.
    pub fn with_default_services() -> Self {
        let mut registry = Self::new();
        registry.register(
            "DriverService",
            Box::new(DriverServiceValidator::new(rand::thread_rng())),
        );
        registry.register(
            "PaymentService",
            Box::new(PaymentServiceValidator::new(rand::thread_rng())),
        );
        registry.register(
            "BookingService",
            Box::new(BookingServiceValidator::new(rand::thread_rng())),
        );
        registry.register(
            "NotificationService",
            Box::new(NotificationServiceValidator::new(rand::thread_rng())),
        );
        registry.register(
            "AnalyticsService",
            Box::new(AnalyticsServiceValidator::new(rand::thread_rng())),
        );
        registry
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::with_default_services()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn unknown_service_always_commits() {
        let registry = ValidatorRegistry::new();
        let validator = registry.for_service("UnknownService");
        let (approved, reason) = validator.validate("op", &HashMap::new());
        assert!(approved);
        assert_eq!(reason, "Ready to commit");
    }

    #[test]
    fn driver_service_requires_driver_id() {
        let validator = DriverServiceValidator::new(StepRng::new(0, 0));
        let (approved, reason) = validator.validate("op", &HashMap::new());
        assert!(!approved);
        assert_eq!(reason, "No driver ID provided");
    }

    #[test]
    fn payment_service_rejects_non_positive_amount() {
        let validator = PaymentServiceValidator::new(StepRng::new(0, 0));
        let mut params = HashMap::new();
        params.insert("amount".to_string(), "0".to_string());
        let (approved, reason) = validator.validate("op", &params);
        assert!(!approved);
        assert_eq!(reason, "Invalid amount");

        params.insert("amount".to_string(), "not-a-number".to_string());
        let (approved, reason) = validator.validate("op", &params);
        assert!(!approved);
        assert_eq!(reason, "Invalid amount format");
    }

    #[test]
    fn probabilistic_validators_are_deterministic_with_seeded_rng() {
        // A fixed-output RNG (StepRng with step 0) makes the probability
        // sample repeatable, exercising the injectable RNG seam without
        // depending on real randomness: both calls must agree.
        let mut params = HashMap::new();
        params.insert("rider_id".to_string(), "r1".to_string());

        let validator = BookingServiceValidator::new(StepRng::new(42, 0));
        let first = validator.validate("op", &params);
        let second = validator.validate("op", &params);
        assert_eq!(first, second);
    }
}
