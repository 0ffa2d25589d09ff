use super::enums::Frequency;
use super::timestamp::Timestamp;
use super::todo::{RecurrenceRule, SubTask, Todo};
use chrono::{Datelike, Duration, Months};

/// Due date of the instance following `current` under `rule`.
///
/// Arithmetic happens on local wall-clock time so a todo due at 09:00 stays
/// due at 09:00. Monthly steps clamp to the end of shorter months.
pub fn next_occurrence(current: &Timestamp, rule: &RecurrenceRule) -> Timestamp {
    let local = current.local().naive_local();
    let next = match rule.frequency {
        Frequency::Daily => local + Duration::days(1),
        Frequency::Weekly => {
            let step = rule
                .weekdays
                .as_ref()
                .and_then(|days| {
                    let today = local.weekday().num_days_from_monday() as u8;
                    (1..=7u8).find(|ahead| days.contains(&((today + ahead) % 7)))
                })
                .unwrap_or(7);
            local + Duration::days(step as i64)
        }
        Frequency::Monthly => local
            .checked_add_months(Months::new(1))
            .unwrap_or(local + Duration::days(30)),
    };
    Timestamp::from_local_naive(next)
}

/// Whether completing a todo with this due date should spawn a successor.
/// Todos without a due date never recur.
pub fn should_create_next(current: Option<&Timestamp>, rule: &RecurrenceRule) -> bool {
    let Some(current) = current else {
        return false;
    };
    match &rule.end_date {
        Some(end) => next_occurrence(current, rule).local_date() <= end.local_date(),
        None => true,
    }
}

/// Build the next instance of a recurring todo that was just completed.
///
/// The successor gets a fresh id, the rule, the next due date and (when the
/// rule asks for it) uncompleted copies of the subtasks. `order` is left for
/// the caller to place it in the pending section.
pub fn successor(completed: &Todo) -> Option<Todo> {
    let rule = completed.recurrence.as_ref()?;
    if !should_create_next(completed.due_date.as_ref(), rule) {
        tracing::debug!(id = %completed.id.short(), "recurrence ended, no successor");
        return None;
    }
    let due = completed.due_date.as_ref()?;

    let mut next = Todo::new(
        completed.content.clone(),
        Some(next_occurrence(due, rule)),
        0,
    );
    next.recurrence = Some(rule.clone());

    if rule.copy_subtasks {
        let mut subtasks = completed.subtasks.clone();
        subtasks.sort_by_key(|st| st.order);
        for original in subtasks {
            let mut copy = SubTask::new(next.id.clone(), original.content, 0);
            copy.due_date = original.due_date;
            next.add_subtask(copy);
        }
    }

    tracing::info!(
        from = %completed.id.short(),
        to = %next.id.short(),
        due = %next.due_date.map(|d| d.local_date().to_string()).unwrap_or_default(),
        "generated next recurring instance"
    );
    Some(next)
}
