//! The 12-step verification checklist
//!
//! Every ticket carries exactly [`TOTAL_STEPS`] steps, created pending with
//! the ticket. The catalogue is fixed; only completion state, photo
//! evidence and notes vary.

use crate::error::CoreError;
use crate::types::{ActorId, TicketId, Timestamp};
use serde::{Deserialize, Serialize};

/// Number of checklist steps per ticket
pub const TOTAL_STEPS: u32 = 12;

/// Coarse grouping of checklist steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
    /// Before physical work
    Preparation,
    /// Physical work
    Installation,
    /// Measurement and service checks
    Testing,
    /// Paperwork and site handover
    Documentation,
}

/// Static description of one checklist step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTemplate {
    /// 1-based position
    pub number: u32,
    /// Short label
    pub label: &'static str,
    /// What the technician must do
    pub description: &'static str,
    /// Photo evidence expected
    pub photo_required: bool,
    /// Grouping
    pub category: StepCategory,
}

const fn step(
    number: u32,
    label: &'static str,
    description: &'static str,
    photo_required: bool,
    category: StepCategory,
) -> StepTemplate {
    StepTemplate {
        number,
        label,
        description,
        photo_required,
        category,
    }
}

/// The fixed checklist, in order
pub const STEP_CATALOGUE: [StepTemplate; TOTAL_STEPS as usize] = [
    step(1, "Site Assessment", "Assess site conditions and confirm location details", true, StepCategory::Preparation),
    step(2, "Material Verification", "Verify all required materials are available and correct", true, StepCategory::Preparation),
    step(3, "Fiber Installation", "Install fiber cable from pole to premises", true, StepCategory::Installation),
    step(4, "Fiber Splicing", "Complete fiber splicing at the distribution point", true, StepCategory::Installation),
    step(5, "ONT Installation", "Mount and connect the ONT device at the customer premises", true, StepCategory::Installation),
    step(6, "Fiber Termination", "Terminate fiber and fit connectors", true, StepCategory::Installation),
    step(7, "ONT Activation & Testing", "Power on the ONT and confirm activation on the network", true, StepCategory::Testing),
    step(8, "Signal Quality Test", "Measure optical power levels and record the readings", true, StepCategory::Testing),
    step(9, "End-to-End Connectivity", "Confirm internet service works end to end", false, StepCategory::Testing),
    step(10, "Cable Management & Labeling", "Secure cable runs and label all connection points", true, StepCategory::Documentation),
    step(11, "Site Cleanup", "Remove debris and restore the work area", true, StepCategory::Documentation),
    step(12, "Documentation & Handover", "Complete documentation and hand the site over to the customer", true, StepCategory::Documentation),
];

/// Catalogue entry for a step number
pub fn template(step_number: u32) -> Result<&'static StepTemplate, CoreError> {
    step_index(step_number).map(|i| &STEP_CATALOGUE[i])
}

/// Zero-based index for a step number, rejecting anything outside 1..=12
pub fn step_index(step_number: u32) -> Result<usize, CoreError> {
    if (1..=TOTAL_STEPS).contains(&step_number) {
        Ok((step_number - 1) as usize)
    } else {
        Err(CoreError::InvalidStep(step_number))
    }
}

/// One checklist step for one ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStep {
    /// Owning ticket
    pub ticket_id: TicketId,
    /// 1..=12
    pub step_number: u32,
    /// Label from the catalogue
    pub step_label: String,
    /// Description from the catalogue
    pub step_description: String,
    /// Photo evidence expected
    pub photo_required: bool,
    /// Done
    pub completed: bool,
    /// Who completed it
    pub completed_by: Option<ActorId>,
    /// When it was completed
    pub completed_at: Option<Timestamp>,
    /// Location of the uploaded photo
    pub photo_url: Option<String>,
    /// Photo checked by a reviewer; implies `photo_url`
    pub photo_verified: bool,
    /// Free-form notes
    pub notes: Option<String>,
}

impl VerificationStep {
    /// A pending step built from the catalogue
    #[must_use]
    pub fn pending(ticket_id: TicketId, template: &StepTemplate) -> Self {
        Self {
            ticket_id,
            step_number: template.number,
            step_label: template.label.to_string(),
            step_description: template.description.to_string(),
            photo_required: template.photo_required,
            completed: false,
            completed_by: None,
            completed_at: None,
            photo_url: None,
            photo_verified: false,
            notes: None,
        }
    }

    /// Photo expected but not uploaded
    #[inline]
    #[must_use]
    pub fn missing_photo(&self) -> bool {
        self.photo_required && self.photo_url.is_none()
    }

    /// All 12 pending steps for a new ticket
    #[must_use]
    pub fn materialize(ticket_id: TicketId) -> Vec<Self> {
        STEP_CATALOGUE
            .iter()
            .map(|t| Self::pending(ticket_id, t))
            .collect()
    }

    /// Apply a partial update.
    ///
    /// Returns `Ok(false)` when nothing changed. Completing stamps
    /// `completed_at` and `completed_by` (falling back to `actor`);
    /// un-completing clears both. A new or blank `photo_url` drops any
    /// earlier verification; `photo_verified = true` needs a photo.
    pub fn apply(
        &mut self,
        update: &StepUpdate,
        actor: &ActorId,
        now: Timestamp,
    ) -> Result<bool, CoreError> {
        let before = self.clone();

        match update.completed {
            Some(true) => {
                self.completed = true;
                self.completed_at = Some(now);
                self.completed_by = Some(
                    update
                        .completed_by
                        .clone()
                        .unwrap_or_else(|| actor.clone()),
                );
            }
            Some(false) => {
                self.completed = false;
                self.completed_at = None;
                self.completed_by = None;
            }
            None => {
                if let Some(by) = &update.completed_by {
                    if !self.completed {
                        return Err(CoreError::validation(format!(
                            "step {} is not complete; completed_by needs completed=true",
                            self.step_number
                        )));
                    }
                    self.completed_by = Some(by.clone());
                }
            }
        }

        if let Some(url) = &update.photo_url {
            let url = Some(url.trim().to_string()).filter(|u| !u.is_empty());
            if url != self.photo_url {
                self.photo_url = url;
                self.photo_verified = false;
            }
        }

        if let Some(verified) = update.photo_verified {
            if verified && self.photo_url.is_none() {
                return Err(CoreError::validation(format!(
                    "step {} has no photo to verify",
                    self.step_number
                )));
            }
            self.photo_verified = verified;
        }

        if let Some(notes) = &update.notes {
            self.notes = Some(notes.clone());
        }

        Ok(*self != before)
    }
}

/// Partial step update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpdate {
    /// Mark complete or incomplete
    #[serde(default)]
    pub completed: Option<bool>,
    /// Override who completed the step
    #[serde(default)]
    pub completed_by: Option<ActorId>,
    /// Attach a photo; blank removes it
    #[serde(default)]
    pub photo_url: Option<String>,
    /// Mark the photo checked or unchecked
    #[serde(default)]
    pub photo_verified: Option<bool>,
    /// Replace notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl StepUpdate {
    /// Mark the step complete
    #[must_use]
    pub fn complete() -> Self {
        Self {
            completed: Some(true),
            ..Self::default()
        }
    }

    /// Mark the step incomplete
    #[must_use]
    pub fn reopen() -> Self {
        Self {
            completed: Some(false),
            ..Self::default()
        }
    }

    /// With notes
    #[inline]
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// With a photo attached
    #[inline]
    #[must_use]
    pub fn with_photo(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }

    /// With the photo marked verified or not
    #[inline]
    #[must_use]
    pub fn with_photo_verified(mut self, verified: bool) -> Self {
        self.photo_verified = Some(verified);
        self
    }

    /// With explicit completer
    #[inline]
    #[must_use]
    pub fn with_completed_by(mut self, by: ActorId) -> Self {
        self.completed_by = Some(by);
        self
    }

    /// No field present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_none()
            && self.completed_by.is_none()
            && self.photo_url.is_none()
            && self.photo_verified.is_none()
            && self.notes.is_none()
    }
}

/// Aggregate checklist completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationProgress {
    /// Steps done
    pub completed_count: u32,
    /// Always 12
    pub total: u32,
    /// Rounded to the nearest whole percent
    pub percentage: u32,
    /// 12 of 12
    pub all_complete: bool,
}

impl VerificationProgress {
    /// Summarise a set of steps
    #[must_use]
    pub fn of(steps: &[VerificationStep]) -> Self {
        let completed = steps.iter().filter(|s| s.completed).count();
        Self::from_count(u32::try_from(completed).unwrap_or(u32::MAX))
    }

    /// Summarise a completed count
    #[must_use]
    pub fn from_count(completed_count: u32) -> Self {
        let completed_count = completed_count.min(TOTAL_STEPS);
        Self {
            completed_count,
            total: TOTAL_STEPS,
            percentage: (completed_count * 100 + TOTAL_STEPS / 2) / TOTAL_STEPS,
            all_complete: completed_count == TOTAL_STEPS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn catalogue_is_numbered_in_order() {
        for (i, t) in STEP_CATALOGUE.iter().enumerate() {
            assert_eq!(t.number as usize, i + 1);
        }
        assert!(!template(9).unwrap().photo_required);
        assert!(template(0).is_err());
        assert_eq!(template(13), Err(CoreError::InvalidStep(13)));
    }

    #[test]
    fn completing_defaults_to_actor_and_reopening_clears() {
        let actor = ActorId::from("tech-7");
        let now = Utc::now();
        let mut s = VerificationStep::pending(TicketId::new(), &STEP_CATALOGUE[0]);

        assert!(s.apply(&StepUpdate::complete(), &actor, now).unwrap());
        assert_eq!(s.completed_by.as_ref(), Some(&actor));
        assert_eq!(s.completed_at, Some(now));

        assert!(s.apply(&StepUpdate::reopen(), &actor, now).unwrap());
        assert_eq!(s.completed_by, None);
        assert_eq!(s.completed_at, None);
    }

    #[test]
    fn completed_by_alone_requires_completion() {
        let mut s = VerificationStep::pending(TicketId::new(), &STEP_CATALOGUE[2]);
        let update = StepUpdate::default().with_completed_by(ActorId::from("lead"));
        assert!(matches!(
            s.apply(&update, &ActorId::from("tech"), Utc::now()),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn notes_only_update_leaves_completion() {
        let mut s = VerificationStep::pending(TicketId::new(), &STEP_CATALOGUE[7]);
        let changed = s
            .apply(&StepUpdate::default().with_notes("-19.8 dBm"), &ActorId::from("t"), Utc::now())
            .unwrap();
        assert!(changed);
        assert!(!s.completed);
        assert_eq!(s.notes.as_deref(), Some("-19.8 dBm"));
    }

    #[test]
    fn photo_must_exist_before_it_is_verified() {
        let actor = ActorId::from("qa");
        let now = Utc::now();
        let mut s = VerificationStep::pending(TicketId::new(), &STEP_CATALOGUE[4]);
        assert!(s.missing_photo());
        assert!(matches!(
            s.apply(&StepUpdate::default().with_photo_verified(true), &actor, now),
            Err(CoreError::Validation(_))
        ));

        let update = StepUpdate::default()
            .with_photo(" https://photos.example/ont-5.jpg ")
            .with_photo_verified(true);
        assert!(s.apply(&update, &actor, now).unwrap());
        assert_eq!(s.photo_url.as_deref(), Some("https://photos.example/ont-5.jpg"));
        assert!(s.photo_verified);
        assert!(!s.missing_photo());

        // same url again changes nothing
        let same = StepUpdate::default().with_photo("https://photos.example/ont-5.jpg");
        assert!(!s.apply(&same, &actor, now).unwrap());
        assert!(s.photo_verified);

        // replacing or removing the photo drops the verification
        assert!(s.apply(&StepUpdate::default().with_photo("https://photos.example/ont-5b.jpg"), &actor, now).unwrap());
        assert!(!s.photo_verified);
        assert!(s.apply(&StepUpdate::default().with_photo("  "), &actor, now).unwrap());
        assert_eq!(s.photo_url, None);
        assert!(s.missing_photo());
    }

    #[test]
    fn step_without_photo_requirement_never_misses_one() {
        let s = VerificationStep::pending(TicketId::new(), template(9).unwrap());
        assert!(!s.missing_photo());
    }

    #[test]
    fn progress_rounds_to_nearest_percent() {
        assert_eq!(VerificationProgress::from_count(0).percentage, 0);
        assert_eq!(VerificationProgress::from_count(1).percentage, 8);
        assert_eq!(VerificationProgress::from_count(10).percentage, 83);
        assert_eq!(VerificationProgress::from_count(11).percentage, 92);
        let full = VerificationProgress::from_count(12);
        assert_eq!(full.percentage, 100);
        assert!(full.all_complete);
    }
}
