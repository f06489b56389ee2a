//! What each request needs before it can be acted on.

use crate::processor::{EntityBag, Field, IntentCategory};

/// One requirement: satisfied when any of its fields is present.
///
/// "Cancel the meeting at 3" names the meeting by time alone, so a delete's
/// single requirement accepts a target, a date, a time or an attendee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub any_of: &'static [Field],
}

impl Requirement {
    pub fn satisfied_by(&self, entities: &EntityBag) -> bool {
        self.any_of.iter().any(|field| entities.contains(*field))
    }

    /// The field named when asking for it.
    pub fn primary(&self) -> Field {
        self.any_of[0]
    }
}

const CREATE_MEETING: &[Requirement] = &[
    Requirement { any_of: &[Field::Title] },
    Requirement { any_of: &[Field::Time] },
];
const DELETE_MEETING: &[Requirement] = &[Requirement {
    any_of: &[Field::Target, Field::Date, Field::Time, Field::Attendees],
}];
const CREATE_TASK: &[Requirement] = &[Requirement { any_of: &[Field::Title] }];
const TARGET_TASK: &[Requirement] = &[Requirement { any_of: &[Field::Target] }];
const SEND_EMAIL: &[Requirement] = &[
    Requirement { any_of: &[Field::Recipients] },
    Requirement { any_of: &[Field::Body] },
];

/// Required fields per category. Queries and chat need nothing.
pub fn requirements(category: IntentCategory) -> &'static [Requirement] {
    match category {
        IntentCategory::CreateMeeting => CREATE_MEETING,
        IntentCategory::DeleteMeeting => DELETE_MEETING,
        IntentCategory::CreateTask => CREATE_TASK,
        IntentCategory::CompleteTask | IntentCategory::DeleteTask => TARGET_TASK,
        IntentCategory::SendEmail => SEND_EMAIL,
        _ => &[],
    }
}

/// Every field a category reads, required or optional.
pub fn relevant_fields(category: IntentCategory) -> &'static [Field] {
    match category {
        IntentCategory::CreateMeeting => &[
            Field::Title,
            Field::Date,
            Field::Time,
            Field::Duration,
            Field::Attendees,
            Field::Location,
        ],
        IntentCategory::DeleteMeeting => {
            &[Field::Target, Field::Date, Field::Time, Field::Attendees]
        }
        IntentCategory::CreateTask => &[
            Field::Title,
            Field::Date,
            Field::Priority,
            Field::Description,
        ],
        IntentCategory::CompleteTask | IntentCategory::DeleteTask => &[Field::Target],
        IntentCategory::SendEmail => &[Field::Recipients, Field::Subject, Field::Body],
        IntentCategory::QueryMeetings => &[Field::Date, Field::Window, Field::Attendees],
        IntentCategory::QueryAvailability => &[Field::Date, Field::Window, Field::Duration],
        IntentCategory::QueryTasks => &[Field::Date, Field::Window, Field::Priority],
        IntentCategory::QueryEmails | IntentCategory::GeneralChat => &[],
    }
}

/// Primary fields of the requirements `entities` leaves unmet.
pub fn missing(category: IntentCategory, entities: &EntityBag) -> Vec<Field> {
    requirements(category)
        .iter()
        .filter(|req| !req.satisfied_by(entities))
        .map(Requirement::primary)
        .collect()
}
