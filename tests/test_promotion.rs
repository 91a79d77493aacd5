//! Integration test: candidate registration and champion promotion

use citibike_mlops::error::{PipelineError, Result};
use citibike_mlops::promotion::{promote_models, PromotionEngine, PromotionOutcome};
use citibike_mlops::registry::{
    register_candidate, Alias, LocalRegistry, ModelRegistry, ModelVersion, Stage, ValidationStatus,
};
use std::collections::BTreeMap;

const MODEL: &str = "xgb-citibike-reg-model";

fn metrics(rmse: f64) -> BTreeMap<String, f64> {
    BTreeMap::from([("rmse".to_string(), rmse), ("r2".to_string(), 0.8)])
}

fn register(registry: &mut impl ModelRegistry, rmse: f64) -> ModelVersion {
    register_candidate(registry, MODEL, "artifacts/model.json", Some("run"), &metrics(rmse)).unwrap()
}

fn stage(registry: &LocalRegistry, version: &str) -> Stage {
    registry.tags(MODEL, version).unwrap()["stage"].parse().unwrap()
}

/// Registry wrapper recording every mutation in call order
struct Recording {
    inner: LocalRegistry,
    calls: Vec<String>,
}

impl ModelRegistry for Recording {
    fn version_by_alias(&self, name: &str, alias: Alias) -> Result<Option<ModelVersion>> {
        self.inner.version_by_alias(name, alias)
    }

    fn set_alias(&mut self, name: &str, alias: Alias, version: &str) -> Result<()> {
        self.calls.push(format!("set_alias {} {}", alias, version));
        self.inner.set_alias(name, alias, version)
    }

    fn delete_alias(&mut self, name: &str, alias: Alias) -> Result<()> {
        self.calls.push(format!("delete_alias {}", alias));
        self.inner.delete_alias(name, alias)
    }

    fn set_tag(&mut self, name: &str, version: &str, key: &str, value: &str) -> Result<()> {
        self.calls.push(format!("set_tag {} {}={}", version, key, value));
        self.inner.set_tag(name, version, key, value)
    }

    fn tags(&self, name: &str, version: &str) -> Result<BTreeMap<String, String>> {
        self.inner.tags(name, version)
    }

    fn latest_version(&self, name: &str) -> Result<Option<ModelVersion>> {
        self.inner.latest_version(name)
    }

    fn create_version(&mut self, name: &str, source: &str, run_id: Option<&str>) -> Result<ModelVersion> {
        self.inner.create_version(name, source, run_id)
    }
}

#[test]
fn test_first_promotion() {
    let mut registry = LocalRegistry::in_memory();
    register(&mut registry, 5.0);

    let outcome = PromotionEngine::new(&mut registry).promote(MODEL).unwrap();
    assert_eq!(outcome, PromotionOutcome::FirstPromotion { version: "1".into() });

    let champion = registry.version_by_alias(MODEL, Alias::Champion).unwrap().unwrap();
    assert_eq!(champion.version, "1");
    let tags = champion.typed_tags().unwrap();
    assert_eq!(tags.stage, Stage::Production);
    assert_eq!(tags.validation_status, ValidationStatus::Approved);
    assert!(registry.version_by_alias(MODEL, Alias::Candidate).unwrap().is_none());
}

#[test]
fn test_strict_improvement_promotes() {
    let mut registry = LocalRegistry::in_memory();
    register(&mut registry, 5.0);
    assert!(promote_models(&mut registry, MODEL).unwrap());
    register(&mut registry, 4.9);

    let outcome = PromotionEngine::new(&mut registry).promote(MODEL).unwrap();
    assert_eq!(
        outcome,
        PromotionOutcome::Promoted {
            version: "2".into(),
            previous: "1".into(),
            candidate_rmse: 4.9,
            champion_rmse: 5.0,
        }
    );

    let champion = registry.version_by_alias(MODEL, Alias::Champion).unwrap().unwrap();
    assert_eq!(champion.version, "2");
    let tags = champion.typed_tags().unwrap();
    assert_eq!(tags.stage, Stage::Production);
    assert_eq!(tags.validation_status, ValidationStatus::Approved);
    assert!(registry.version_by_alias(MODEL, Alias::Candidate).unwrap().is_none());
    assert_eq!(stage(&registry, "1"), Stage::Archived);
}

#[test]
fn test_tie_keeps_champion() {
    let mut registry = LocalRegistry::in_memory();
    register(&mut registry, 5.0);
    promote_models(&mut registry, MODEL).unwrap();
    register(&mut registry, 5.0);

    assert!(!promote_models(&mut registry, MODEL).unwrap());

    assert_eq!(registry.version_by_alias(MODEL, Alias::Champion).unwrap().unwrap().version, "1");
    assert_eq!(stage(&registry, "1"), Stage::Production);
    assert_eq!(stage(&registry, "2"), Stage::Archived);
    let candidate = registry.version_by_alias(MODEL, Alias::Candidate).unwrap().unwrap();
    assert_eq!(candidate.typed_tags().unwrap().validation_status, ValidationStatus::Pending);
}

#[test]
fn test_worse_candidate_rejected() {
    let mut registry = LocalRegistry::in_memory();
    register(&mut registry, 5.0);
    promote_models(&mut registry, MODEL).unwrap();
    register(&mut registry, 6.5);

    let outcome = PromotionEngine::new(&mut registry).promote(MODEL).unwrap();
    assert!(matches!(outcome, PromotionOutcome::Rejected { ref champion, .. } if champion == "1"));
}

#[test]
fn test_missing_candidate() {
    let mut registry = LocalRegistry::in_memory();
    let err = promote_models(&mut registry, MODEL).unwrap_err();
    assert!(matches!(err, PipelineError::MissingCandidate(_)));
}

#[test]
fn test_non_numeric_rmse_aborts_without_changes() {
    let mut registry = LocalRegistry::in_memory();
    register(&mut registry, 5.0);
    promote_models(&mut registry, MODEL).unwrap();
    register(&mut registry, 4.0);
    registry.set_tag(MODEL, "2", "rmse", "not-a-number").unwrap();

    let err = promote_models(&mut registry, MODEL).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidTag { .. }));
    assert_eq!(registry.version_by_alias(MODEL, Alias::Champion).unwrap().unwrap().version, "1");
    assert_eq!(stage(&registry, "2"), Stage::Staging);
}

#[test]
fn test_promotion_mutation_order() {
    let mut registry = Recording {
        inner: LocalRegistry::in_memory(),
        calls: Vec::new(),
    };
    register(&mut registry, 5.0);
    promote_models(&mut registry, MODEL).unwrap();
    register(&mut registry, 3.0);
    registry.calls.clear();

    promote_models(&mut registry, MODEL).unwrap();
    assert_eq!(
        registry.calls,
        vec![
            "set_tag 1 stage=Archived",
            "delete_alias candidate",
            "set_alias champion 2",
            "set_tag 2 stage=Production",
            "set_tag 2 validation_status=approved",
        ]
    );
}

#[test]
fn test_registry_persists_promotion() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut registry = LocalRegistry::open(dir.path()).unwrap();
        register(&mut registry, 5.0);
        promote_models(&mut registry, MODEL).unwrap();
    }
    let registry = LocalRegistry::open(dir.path()).unwrap();
    assert_eq!(registry.version_by_alias(MODEL, Alias::Champion).unwrap().unwrap().version, "1");
}
