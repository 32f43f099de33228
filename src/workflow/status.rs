//! Application status state machine.
//!
//! [`ApplicationStatus::apply`] is the only transition table in the crate.
//! Handlers and services never assign a status directly: they name a
//! [`WorkflowEvent`] and let the table decide where the application lands.
//!
//! ```text
//! SUBMITTED ──start_document_check──▶ DOCUMENT_CHECK
//! DOCUMENT_CHECK ──forward──▶ PRELIMINARY_REVIEW
//! DOCUMENT_CHECK ──return_from_document_check──▶ RETURNED_FOR_RESUBMISSION
//! PRELIMINARY_REVIEW ──return_from_preliminary_review──▶ RETURNED_FOR_RESUBMISSION
//! PRELIMINARY_REVIEW ──expedite──▶ APPROVED
//! PRELIMINARY_REVIEW ──assign(ERC|CTSC|ARWC)──▶ ERC_REVIEW | CTSC_REVIEW | ARWC_REVIEW
//! *_REVIEW ──schedule──▶ SCHEDULED_FOR_MEETING
//! SCHEDULED_FOR_MEETING | AWAITING_RATIFICATION ──record_decision──▶ AWAITING_RATIFICATION
//! SCHEDULED_FOR_MEETING | AWAITING_RATIFICATION ──cancel_meeting(t)──▶ review status of t
//! AWAITING_RATIFICATION ──ratify(APPROVED|REJECTED|REVISE)──▶ APPROVED | REJECTED | RETURNED_FOR_RESUBMISSION
//! RETURNED_FOR_RESUBMISSION ──resubmit──▶ SUBMITTED
//! ```

use crate::models::committee::CommitteeType;
use crate::models::meeting::Decision;

text_enum! {
    /// Lifecycle status of an application.
    pub enum ApplicationStatus {
        Submitted => "SUBMITTED",
        DocumentCheck => "DOCUMENT_CHECK",
        PreliminaryReview => "PRELIMINARY_REVIEW",
        ReturnedForResubmission => "RETURNED_FOR_RESUBMISSION",
        ErcReview => "ERC_REVIEW",
        CtscReview => "CTSC_REVIEW",
        ArwcReview => "ARWC_REVIEW",
        ScheduledForMeeting => "SCHEDULED_FOR_MEETING",
        AwaitingRatification => "AWAITING_RATIFICATION",
        Approved => "APPROVED",
        Rejected => "REJECTED",
    }
}

/// Something that happens to an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEvent {
    StartDocumentCheck,
    ForwardToPreliminaryReview,
    /// Office staff return after checking documents
    ReturnFromDocumentCheck,
    /// Administrator return during preliminary review
    ReturnFromPreliminaryReview,
    ExpediteApproval,
    AssignCommittee(CommitteeType),
    ScheduleForMeeting,
    CancelMeeting(CommitteeType),
    RecordDecision,
    Ratify(Decision),
    Resubmit,
}

impl WorkflowEvent {
    /// Stable name stored in the status history and shown to clients.
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::StartDocumentCheck => "start_document_check",
            WorkflowEvent::ForwardToPreliminaryReview => "forward_to_preliminary_review",
            WorkflowEvent::ReturnFromDocumentCheck => "return_from_document_check",
            WorkflowEvent::ReturnFromPreliminaryReview => "return_from_preliminary_review",
            WorkflowEvent::ExpediteApproval => "expedite_approval",
            WorkflowEvent::AssignCommittee(_) => "assign_committee",
            WorkflowEvent::ScheduleForMeeting => "schedule_for_meeting",
            WorkflowEvent::CancelMeeting(_) => "cancel_meeting",
            WorkflowEvent::RecordDecision => "record_decision",
            WorkflowEvent::Ratify(_) => "ratify",
            WorkflowEvent::Resubmit => "resubmit",
        }
    }

    /// One representative of every event kind, used to walk the table.
    const EVENT_SAMPLES: [WorkflowEvent; 11] = [
        WorkflowEvent::StartDocumentCheck,
        WorkflowEvent::ForwardToPreliminaryReview,
        WorkflowEvent::ReturnFromDocumentCheck,
        WorkflowEvent::ReturnFromPreliminaryReview,
        WorkflowEvent::ExpediteApproval,
        WorkflowEvent::AssignCommittee(CommitteeType::Erc),
        WorkflowEvent::ScheduleForMeeting,
        WorkflowEvent::CancelMeeting(CommitteeType::Erc),
        WorkflowEvent::RecordDecision,
        WorkflowEvent::Ratify(Decision::Approved),
        WorkflowEvent::Resubmit,
    ];
}

/// The transition table refused an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {event} an application in status {from}")]
    NotAllowed {
        from: ApplicationStatus,
        event: &'static str,
    },

    #[error("a PENDING decision cannot be ratified")]
    UndecidedRatification,
}

impl ApplicationStatus {
    /// Committee review status for a committee type.
    pub fn review_for(committee: CommitteeType) -> Self {
        match committee {
            CommitteeType::Erc => ApplicationStatus::ErcReview,
            CommitteeType::Ctsc => ApplicationStatus::CtscReview,
            CommitteeType::Arwc => ApplicationStatus::ArwcReview,
        }
    }

    /// Committee whose review this status represents, if any.
    pub fn reviewing_committee(&self) -> Option<CommitteeType> {
        match self {
            ApplicationStatus::ErcReview => Some(CommitteeType::Erc),
            ApplicationStatus::CtscReview => Some(CommitteeType::Ctsc),
            ApplicationStatus::ArwcReview => Some(CommitteeType::Arwc),
            _ => None,
        }
    }

    pub fn is_committee_review(&self) -> bool {
        self.reviewing_committee().is_some()
    }

    /// No event leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Approved | ApplicationStatus::Rejected)
    }

    /// Status reached by applying `event`, or why it is refused.
    pub fn apply(self, event: WorkflowEvent) -> Result<Self, TransitionError> {
        use ApplicationStatus as S;
        use WorkflowEvent as E;

        let next = match (self, event) {
            (S::Submitted, E::StartDocumentCheck) => S::DocumentCheck,
            (S::DocumentCheck, E::ForwardToPreliminaryReview) => S::PreliminaryReview,
            (S::DocumentCheck, E::ReturnFromDocumentCheck) => S::ReturnedForResubmission,
            (S::PreliminaryReview, E::ReturnFromPreliminaryReview) => S::ReturnedForResubmission,
            (S::PreliminaryReview, E::ExpediteApproval) => S::Approved,
            (S::PreliminaryReview, E::AssignCommittee(committee)) => S::review_for(committee),
            (status, E::ScheduleForMeeting) if status.is_committee_review() => {
                S::ScheduledForMeeting
            }
            (S::ScheduledForMeeting | S::AwaitingRatification, E::RecordDecision) => {
                S::AwaitingRatification
            }
            (S::ScheduledForMeeting | S::AwaitingRatification, E::CancelMeeting(committee)) => {
                S::review_for(committee)
            }
            (S::AwaitingRatification, E::Ratify(decision)) => match decision {
                Decision::Approved => S::Approved,
                Decision::Rejected => S::Rejected,
                Decision::Revise => S::ReturnedForResubmission,
                Decision::Pending => return Err(TransitionError::UndecidedRatification),
            },
            (S::ReturnedForResubmission, E::Resubmit) => S::Submitted,
            (from, event) => {
                return Err(TransitionError::NotAllowed {
                    from,
                    event: event.name(),
                });
            }
        };

        Ok(next)
    }

    /// Names of the events this status accepts.
    pub fn allowed_events(&self) -> Vec<&'static str> {
        WorkflowEvent::EVENT_SAMPLES
            .iter()
            .filter(|event| self.apply(**event).is_ok())
            .map(WorkflowEvent::name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ApplicationStatus as S;
    use WorkflowEvent as E;

    #[test]
    fn happy_path_through_committee() {
        let status = S::Submitted
            .apply(E::StartDocumentCheck)
            .and_then(|s| s.apply(E::ForwardToPreliminaryReview))
            .and_then(|s| s.apply(E::AssignCommittee(CommitteeType::Ctsc)))
            .and_then(|s| s.apply(E::ScheduleForMeeting))
            .and_then(|s| s.apply(E::RecordDecision))
            .and_then(|s| s.apply(E::Ratify(Decision::Approved)))
            .expect("every step is allowed");

        assert_eq!(status, S::Approved);
    }

    #[test]
    fn assignment_lands_in_committee_review() {
        for committee in CommitteeType::ALL {
            let status = S::PreliminaryReview
                .apply(E::AssignCommittee(*committee))
                .unwrap();
            assert_eq!(status.reviewing_committee(), Some(*committee));
        }
    }

    #[test]
    fn expedited_approval_skips_committee() {
        assert_eq!(S::PreliminaryReview.apply(E::ExpediteApproval), Ok(S::Approved));
        assert!(S::ErcReview.apply(E::ExpediteApproval).is_err());
    }

    #[test]
    fn ratification_maps_decisions() {
        let cases = [
            (Decision::Approved, S::Approved),
            (Decision::Rejected, S::Rejected),
            (Decision::Revise, S::ReturnedForResubmission),
        ];
        for (decision, expected) in cases {
            assert_eq!(S::AwaitingRatification.apply(E::Ratify(decision)), Ok(expected));
        }
    }

    #[test]
    fn pending_decision_cannot_be_ratified() {
        assert_eq!(
            S::AwaitingRatification.apply(E::Ratify(Decision::Pending)),
            Err(TransitionError::UndecidedRatification)
        );
    }

    #[test]
    fn ratification_requires_recorded_decision() {
        let err = S::ScheduledForMeeting
            .apply(E::Ratify(Decision::Approved))
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::NotAllowed {
                from: S::ScheduledForMeeting,
                event: "ratify",
            }
        );
    }

    #[test]
    fn decisions_can_be_re_recorded_until_ratified() {
        let status = S::ScheduledForMeeting.apply(E::RecordDecision).unwrap();
        assert_eq!(status.apply(E::RecordDecision), Ok(S::AwaitingRatification));
    }

    #[test]
    fn terminal_statuses_accept_nothing() {
        for status in [S::Approved, S::Rejected] {
            assert!(status.is_terminal());
            assert!(status.allowed_events().is_empty());
            for event in WorkflowEvent::EVENT_SAMPLES {
                assert!(status.apply(event).is_err(), "{status} accepted {event:?}");
            }
        }
    }

    #[test]
    fn every_non_terminal_status_has_a_way_forward() {
        for status in S::ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(
                !status.allowed_events().is_empty(),
                "{status} is a dead end"
            );
        }
    }

    #[test]
    fn scheduling_only_from_committee_review() {
        for status in S::ALL {
            let result = status.apply(E::ScheduleForMeeting);
            assert_eq!(result.is_ok(), status.is_committee_review(), "{status}");
        }
    }

    #[test]
    fn cancelled_meeting_returns_to_committee_review() {
        assert_eq!(
            S::AwaitingRatification.apply(E::CancelMeeting(CommitteeType::Arwc)),
            Ok(S::ArwcReview)
        );
        assert!(S::ErcReview.apply(E::CancelMeeting(CommitteeType::Erc)).is_err());
    }

    #[test]
    fn returned_applications_can_be_resubmitted() {
        let returned = S::DocumentCheck.apply(E::ReturnFromDocumentCheck).unwrap();
        assert_eq!(returned.apply(E::Resubmit), Ok(S::Submitted));
        assert!(S::Submitted.apply(E::Resubmit).is_err());
    }

    #[test]
    fn returns_are_tied_to_their_stage() {
        assert_eq!(
            S::DocumentCheck.apply(E::ReturnFromDocumentCheck),
            Ok(S::ReturnedForResubmission)
        );
        assert_eq!(
            S::PreliminaryReview.apply(E::ReturnFromPreliminaryReview),
            Ok(S::ReturnedForResubmission)
        );
        assert!(S::PreliminaryReview.apply(E::ReturnFromDocumentCheck).is_err());
        assert!(S::DocumentCheck.apply(E::ReturnFromPreliminaryReview).is_err());

        for status in S::ALL {
            assert_eq!(
                status.apply(E::ReturnFromDocumentCheck).is_ok(),
                *status == S::DocumentCheck,
                "{status}"
            );
            assert_eq!(
                status.apply(E::ReturnFromPreliminaryReview).is_ok(),
                *status == S::PreliminaryReview,
                "{status}"
            );
        }
    }

    #[test]
    fn document_check_cannot_be_skipped() {
        assert!(S::Submitted.apply(E::ForwardToPreliminaryReview).is_err());
        assert!(S::Submitted.apply(E::AssignCommittee(CommitteeType::Erc)).is_err());
    }

    #[test]
    fn allowed_events_for_preliminary_review() {
        assert_eq!(
            S::PreliminaryReview.allowed_events(),
            vec!["return_from_preliminary_review", "expedite_approval", "assign_committee"]
        );
    }

    #[test]
    fn status_text_round_trips_and_rejects_unknown() {
        for status in S::ALL {
            assert_eq!(status.as_str().parse::<S>(), Ok(*status));
        }
        assert!("IN_REVIEW".parse::<S>().is_err());
        assert_eq!(
            serde_json::to_string(&S::ReturnedForResubmission).unwrap(),
            "\"RETURNED_FOR_RESUBMISSION\""
        );
    }

    #[test]
    fn error_message_names_event_and_status() {
        let err = S::Rejected.apply(E::Resubmit).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot resubmit an application in status REJECTED"
        );
    }
}
