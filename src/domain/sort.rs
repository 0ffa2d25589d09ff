use super::document::Document;
use super::enums::{Section, SortOrder};
use super::todo::{Todo, TodoId};
use crate::error::{Result, TodoError};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::HashSet;

fn by_content(a: &Todo, b: &Todo) -> Ordering {
    a.content
        .cmp(&b.content)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

fn by_manual_order(a: &Todo, b: &Todo) -> Ordering {
    a.order
        .cmp(&b.order)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Sort todos for display under the given mode.
///
/// Undated items always come after dated ones in the date-based modes.
/// `today` is the reference day for [`SortOrder::TodayFirst`].
pub fn sort_todos<'a, I>(todos: I, mode: SortOrder, today: NaiveDate) -> Vec<&'a Todo>
where
    I: IntoIterator<Item = &'a Todo>,
{
    let (mut dated, mut undated): (Vec<&Todo>, Vec<&Todo>) =
        todos.into_iter().partition(|t| t.due_date.is_some());

    match mode {
        SortOrder::Manual => {
            dated.append(&mut undated);
            dated.sort_by(|a, b| by_manual_order(a, b));
            return dated;
        }
        SortOrder::DueDateAsc => {
            dated.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| by_content(a, b)));
        }
        SortOrder::DueDateDesc => {
            dated.sort_by(|a, b| b.due_date.cmp(&a.due_date).then_with(|| by_content(b, a)));
        }
        SortOrder::TodayFirst => {
            let (mut due_today, mut others): (Vec<&Todo>, Vec<&Todo>) =
                dated.into_iter().partition(|t| t.is_due_on(today));
            due_today.sort_by(|a, b| by_content(a, b));
            others.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| by_content(a, b)));
            due_today.append(&mut others);
            dated = due_today;
        }
    }

    undated.sort_by(|a, b| by_content(a, b));
    tracing::trace!(mode = %mode, dated = dated.len(), undated = undated.len(), "sorted todos");
    dated.append(&mut undated);
    dated
}

/// Split the document into (pending, completed), each sorted by `mode`
pub fn split_sections(
    doc: &Document,
    mode: SortOrder,
    today: NaiveDate,
) -> (Vec<&Todo>, Vec<&Todo>) {
    let pending = sort_todos(doc.todos.iter().filter(|t| !t.completed), mode, today);
    let completed = sort_todos(doc.todos.iter().filter(|t| t.completed), mode, today);
    (pending, completed)
}

/// Assign dense orders to a section following `ordered_ids`.
/// Returns how many todos changed order.
fn assign_orders(doc: &mut Document, ordered_ids: &[TodoId]) -> usize {
    let mut updated = 0;
    for (new_order, id) in ordered_ids.iter().enumerate() {
        if let Some(todo) = doc.find_mut(id) {
            if todo.order != new_order as u32 {
                tracing::debug!(id = %todo.id.short(), from = todo.order, to = new_order, "order sync");
                todo.order = new_order as u32;
                updated += 1;
            }
        }
    }
    updated
}

/// Store pending todos first, each section in order
pub fn arrange(doc: &mut Document) {
    doc.todos.sort_by_key(|t| (t.completed, t.order));
}

/// Make `order` dense `0..n-1` within each section and within each todo's
/// subtasks, keeping the existing relative order. Returns whether anything
/// was renumbered.
pub fn normalize_orders(doc: &mut Document) -> bool {
    let mut changed = false;
    for section in [Section::Pending, Section::Completed] {
        let ids: Vec<TodoId> = doc.section(section).iter().map(|t| t.id.clone()).collect();
        changed |= assign_orders(doc, &ids) > 0;
    }
    for todo in &mut doc.todos {
        changed |= todo.renumber_subtasks();
    }
    arrange(doc);
    changed
}

/// Re-sort both sections under `mode`, persist the displayed order into
/// `order`, and make `mode` the active sort order.
pub fn apply_sort_mode(doc: &mut Document, mode: SortOrder, today: NaiveDate) -> usize {
    let (pending, completed) = split_sections(doc, mode, today);
    let pending: Vec<TodoId> = pending.iter().map(|t| t.id.clone()).collect();
    let completed: Vec<TodoId> = completed.iter().map(|t| t.id.clone()).collect();

    let updated = assign_orders(doc, &pending) + assign_orders(doc, &completed);
    doc.settings.sort_order = mode;
    arrange(doc);

    if updated > 0 {
        tracing::info!(mode = %mode, updated, "sort mode applied");
    }
    updated
}

/// Replace a section's order with `ordered_ids`, which must list exactly the
/// section's todos. Switches the document to manual sorting.
pub fn reorder_section(doc: &mut Document, section: Section, ordered_ids: &[TodoId]) -> Result<()> {
    let current: HashSet<&TodoId> = doc
        .todos
        .iter()
        .filter(|t| t.section() == section)
        .map(|t| &t.id)
        .collect();

    let mut seen = HashSet::new();
    for id in ordered_ids {
        if !seen.insert(id) {
            return Err(TodoError::InvalidReorder(format!("{} listed twice", id)));
        }
        if !current.contains(id) {
            return match doc.find(id) {
                Some(todo) => Err(TodoError::WrongSection {
                    id: id.clone(),
                    expected: section,
                    actual: todo.section(),
                }),
                None => Err(TodoError::NotFound(id.to_string())),
            };
        }
    }
    if seen.len() != current.len() {
        return Err(TodoError::InvalidReorder(format!(
            "expected all {} {} todos, got {}",
            current.len(),
            section,
            seen.len()
        )));
    }

    assign_orders(doc, ordered_ids);
    doc.settings.sort_order = SortOrder::Manual;
    arrange(doc);
    Ok(())
}

/// Drag-and-drop one todo to `position` (clamped) within `section`.
/// Returns the position it landed at.
pub fn move_within_section(
    doc: &mut Document,
    id: &TodoId,
    section: Section,
    position: usize,
) -> Result<usize> {
    let todo = doc.find(id).ok_or_else(|| TodoError::NotFound(id.to_string()))?;
    if todo.section() != section {
        return Err(TodoError::WrongSection {
            id: id.clone(),
            expected: section,
            actual: todo.section(),
        });
    }

    let mut ids: Vec<TodoId> = doc.section(section).iter().map(|t| t.id.clone()).collect();
    ids.retain(|other| other != id);
    let position = position.min(ids.len());
    ids.insert(position, id.clone());

    reorder_section(doc, section, &ids)?;
    tracing::info!(id = %id.short(), position, section = %section, "moved todo");
    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timestamp;
    use pretty_assertions::assert_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn todo(id: &str, content: &str, due: Option<u32>, order: u32) -> Todo {
        let due = due.map(|d| Timestamp::from_local_naive(day(d).and_hms_opt(12, 0, 0).unwrap()));
        let mut t = Todo::new(content.to_string(), due, order);
        t.id = TodoId::from(id);
        t
    }

    fn ids(todos: &[&Todo]) -> Vec<String> {
        todos.iter().map(|t| t.id.to_string()).collect()
    }

    fn sample() -> Vec<Todo> {
        vec![
            todo("a", "alpha", Some(12), 3),
            todo("b", "bravo", None, 0),
            todo("c", "charlie", Some(10), 1),
            todo("d", "delta", Some(15), 2),
            todo("e", "echo", None, 4),
        ]
    }

    #[test]
    fn test_manual_sort_uses_order_only() {
        let todos = sample();
        assert_eq!(ids(&sort_todos(&todos, SortOrder::Manual, day(1))), vec!["b", "c", "d", "a", "e"]);
    }

    #[test]
    fn test_due_date_asc_puts_undated_last() {
        let todos = sample();
        assert_eq!(ids(&sort_todos(&todos, SortOrder::DueDateAsc, day(1))), vec!["c", "a", "d", "b", "e"]);
    }

    #[test]
    fn test_due_date_desc_puts_undated_last() {
        let todos = sample();
        assert_eq!(ids(&sort_todos(&todos, SortOrder::DueDateDesc, day(1))), vec!["d", "a", "c", "b", "e"]);
    }

    #[test]
    fn test_today_first() {
        let todos = sample();
        assert_eq!(ids(&sort_todos(&todos, SortOrder::TodayFirst, day(12))), vec!["a", "c", "d", "b", "e"]);
    }

    #[test]
    fn test_same_due_date_breaks_ties_by_content() {
        let todos = vec![todo("x", "zulu", Some(5), 0), todo("y", "alpha", Some(5), 1)];
        assert_eq!(ids(&sort_todos(&todos, SortOrder::DueDateAsc, day(1))), vec!["y", "x"]);
    }

    #[test]
    fn test_normalize_orders_is_dense_per_section() {
        let mut doc = Document::default();
        doc.todos = sample();
        doc.todos[0].completed = true;
        doc.todos[0].order = 7;
        doc.todos[3].order = 10;

        assert!(normalize_orders(&mut doc));
        let pending: Vec<(String, u32)> = doc
            .section(Section::Pending)
            .iter()
            .map(|t| (t.id.to_string(), t.order))
            .collect();
        assert_eq!(
            pending,
            vec![("b".into(), 0), ("c".into(), 1), ("e".into(), 2), ("d".into(), 3)]
        );
        assert_eq!(doc.section(Section::Completed)[0].order, 0);
        // pending stored first
        assert!(!doc.todos[0].completed);
        assert!(doc.todos[4].completed);

        assert!(!normalize_orders(&mut doc));
    }

    #[test]
    fn test_apply_sort_mode_syncs_orders() {
        let mut doc = Document::default();
        doc.todos = sample();
        apply_sort_mode(&mut doc, SortOrder::DueDateAsc, day(1));

        assert_eq!(doc.settings.sort_order, SortOrder::DueDateAsc);
        assert_eq!(ids(&doc.section(Section::Pending)), vec!["c", "a", "d", "b", "e"]);
        let orders: Vec<u32> = doc.section(Section::Pending).iter().map(|t| t.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_reorder_section_switches_to_manual() {
        let mut doc = Document::default();
        doc.todos = sample();
        let wanted: Vec<TodoId> = ["e", "d", "c", "b", "a"].iter().map(|s| TodoId::from(*s)).collect();

        reorder_section(&mut doc, Section::Pending, &wanted).unwrap();
        assert_eq!(doc.settings.sort_order, SortOrder::Manual);
        assert_eq!(ids(&doc.section(Section::Pending)), vec!["e", "d", "c", "b", "a"]);
    }

    #[test]
    fn test_reorder_section_rejects_partial_or_foreign_lists() {
        let mut doc = Document::default();
        doc.todos = sample();
        doc.todos[4].completed = true;

        let partial: Vec<TodoId> = ["a", "b"].iter().map(|s| TodoId::from(*s)).collect();
        assert!(matches!(
            reorder_section(&mut doc, Section::Pending, &partial),
            Err(TodoError::InvalidReorder(_))
        ));

        let foreign: Vec<TodoId> = ["a", "b", "c", "d", "e"].iter().map(|s| TodoId::from(*s)).collect();
        assert!(matches!(
            reorder_section(&mut doc, Section::Pending, &foreign),
            Err(TodoError::WrongSection { .. })
        ));

        let duplicate: Vec<TodoId> = ["a", "a", "b", "c"].iter().map(|s| TodoId::from(*s)).collect();
        assert!(matches!(
            reorder_section(&mut doc, Section::Pending, &duplicate),
            Err(TodoError::InvalidReorder(_))
        ));

        let unknown: Vec<TodoId> = ["zz"].iter().map(|s| TodoId::from(*s)).collect();
        assert!(matches!(
            reorder_section(&mut doc, Section::Pending, &unknown),
            Err(TodoError::NotFound(_))
        ));
        // failed attempts leave the mode alone
        assert_eq!(doc.settings.sort_order, SortOrder::DueDateAsc);
    }

    #[test]
    fn test_move_within_section() {
        let mut doc = Document::default();
        doc.todos = sample();
        normalize_orders(&mut doc);
        // manual order: b c d a e

        let landed = move_within_section(&mut doc, &TodoId::from("e"), Section::Pending, 0).unwrap();
        assert_eq!(landed, 0);
        assert_eq!(ids(&doc.section(Section::Pending)), vec!["e", "b", "c", "d", "a"]);

        let landed = move_within_section(&mut doc, &TodoId::from("b"), Section::Pending, 99).unwrap();
        assert_eq!(landed, 4);
        assert_eq!(ids(&doc.section(Section::Pending)), vec!["e", "c", "d", "a", "b"]);
        assert_eq!(doc.settings.sort_order, SortOrder::Manual);

        assert!(matches!(
            move_within_section(&mut doc, &TodoId::from("a"), Section::Completed, 0),
            Err(TodoError::WrongSection { .. })
        ));
    }

    #[test]
    fn test_repeated_moves_keep_dense_permutation() {
        let mut doc = Document::default();
        doc.todos = sample();
        normalize_orders(&mut doc);

        let moves = [("a", 2), ("e", 0), ("c", 4), ("a", 0), ("d", 3), ("b", 1)];
        for (id, pos) in moves {
            move_within_section(&mut doc, &TodoId::from(id), Section::Pending, pos).unwrap();
            let mut orders: Vec<u32> = doc.todos.iter().map(|t| t.order).collect();
            orders.sort_unstable();
            assert_eq!(orders, vec![0, 1, 2, 3, 4]);
        }
    }
}
