//! Champion/candidate promotion
//!
//! Decides whether the freshly registered `candidate` replaces the current
//! `champion`, then applies the alias and tag transitions through the
//! registry handle it was given.

use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::registry::{Alias, ModelRegistry, ModelVersion, Stage, ValidationStatus, STAGE_KEY, STATUS_KEY};

/// Result of one promotion decision
#[derive(Debug, Clone, PartialEq)]
pub enum PromotionOutcome {
    /// No champion existed; the candidate took the alias unconditionally
    FirstPromotion { version: String },
    /// The candidate beat the champion
    Promoted {
        version: String,
        previous: String,
        candidate_rmse: f64,
        champion_rmse: f64,
    },
    /// The champion kept its alias; the candidate was archived unless it
    /// already was the champion
    Rejected {
        version: String,
        champion: String,
        candidate_rmse: f64,
        champion_rmse: f64,
    },
}

impl PromotionOutcome {
    pub fn is_promoted(&self) -> bool {
        !matches!(self, PromotionOutcome::Rejected { .. })
    }
}

/// Promotion state machine bound to one registry handle
pub struct PromotionEngine<'a, R: ModelRegistry + ?Sized> {
    registry: &'a mut R,
}

impl<'a, R: ModelRegistry + ?Sized> PromotionEngine<'a, R> {
    pub fn new(registry: &'a mut R) -> Self {
        Self { registry }
    }

    /// Compare candidate and champion of `name` and apply the decision
    ///
    /// Lower `rmse` wins; a tie keeps the incumbent.
    pub fn promote(&mut self, name: &str) -> Result<PromotionOutcome> {
        let candidate = self
            .registry
            .version_by_alias(name, Alias::Candidate)?
            .ok_or_else(|| PipelineError::MissingCandidate(name.to_string()))?;

        let Some(champion) = self.registry.version_by_alias(name, Alias::Champion)? else {
            info!(model = name, version = %candidate.version, "No champion found, promoting candidate");
            self.crown(name, &candidate)?;
            return Ok(PromotionOutcome::FirstPromotion {
                version: candidate.version,
            });
        };

        let candidate_rmse = candidate.rmse()?;
        let champion_rmse = champion.rmse()?;
        info!(
            model = name,
            candidate = %candidate.version,
            candidate_rmse,
            champion = %champion.version,
            champion_rmse,
            "Comparing candidate against champion"
        );

        if candidate.version == champion.version {
            warn!(model = name, version = %candidate.version, "Candidate is already champion, nothing to do");
            return Ok(PromotionOutcome::Rejected {
                version: candidate.version,
                champion: champion.version,
                candidate_rmse,
                champion_rmse,
            });
        }

        if candidate_rmse < champion_rmse {
            self.registry
                .set_tag(name, &champion.version, STAGE_KEY, Stage::Archived.as_str())?;
            self.crown(name, &candidate)?;
            info!(model = name, version = %candidate.version, "Candidate promoted to champion");
            Ok(PromotionOutcome::Promoted {
                version: candidate.version,
                previous: champion.version,
                candidate_rmse,
                champion_rmse,
            })
        } else {
            self.registry
                .set_tag(name, &candidate.version, STAGE_KEY, Stage::Archived.as_str())?;
            warn!(model = name, version = %candidate.version, "Candidate rejected, champion kept");
            Ok(PromotionOutcome::Rejected {
                version: candidate.version,
                champion: champion.version,
                candidate_rmse,
                champion_rmse,
            })
        }
    }

    fn crown(&mut self, name: &str, candidate: &ModelVersion) -> Result<()> {
        self.registry.delete_alias(name, Alias::Candidate)?;
        self.registry.set_alias(name, Alias::Champion, &candidate.version)?;
        self.registry
            .set_tag(name, &candidate.version, STAGE_KEY, Stage::Production.as_str())?;
        self.registry.set_tag(
            name,
            &candidate.version,
            STATUS_KEY,
            ValidationStatus::Approved.as_str(),
        )
    }
}

/// Run the promotion for `name`; returns whether the candidate was promoted
pub fn promote_models<R: ModelRegistry + ?Sized>(registry: &mut R, name: &str) -> Result<bool> {
    Ok(PromotionEngine::new(registry).promote(name)?.is_promoted())
}
