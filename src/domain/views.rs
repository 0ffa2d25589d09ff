use super::document::Document;
use super::enums::{Section, SortOrder};
use super::sort::sort_todos;
use super::todo::Todo;
use chrono::NaiveDate;

/// Where a search query matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
    Content,
    /// Index of the matching subtask within the todo
    Subtask(usize),
}

/// A todo that matched a search query
#[derive(Debug, Clone)]
pub struct SearchHit<'a> {
    pub todo: &'a Todo,
    pub fields: Vec<MatchField>,
}

/// Case-insensitive substring search over todo and subtask content.
///
/// An empty (or blank) query matches every todo. Hits come back in storage
/// order, which keeps pending todos ahead of completed ones.
pub fn search<'a>(doc: &'a Document, query: &str) -> Vec<SearchHit<'a>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return doc
            .todos
            .iter()
            .map(|todo| SearchHit {
                todo,
                fields: Vec::new(),
            })
            .collect();
    }

    let mut hits = Vec::new();
    for todo in &doc.todos {
        let mut fields = Vec::new();
        if todo.content.to_lowercase().contains(&needle) {
            fields.push(MatchField::Content);
        }
        for (idx, subtask) in todo.subtasks.iter().enumerate() {
            if subtask.content.to_lowercase().contains(&needle) {
                fields.push(MatchField::Subtask(idx));
            }
        }
        if !fields.is_empty() {
            hits.push(SearchHit { todo, fields });
        }
    }
    tracing::debug!(query, hits = hits.len(), "search");
    hits
}

/// One printable line of the list: a todo or one of its subtasks
#[derive(Debug, Clone)]
pub struct ListRow<'a> {
    pub section: Section,
    /// 0 for todos, 1 for subtasks
    pub depth: usize,
    /// Last subtask of its parent
    pub is_last: bool,
    pub todo: &'a Todo,
    pub subtask_index: Option<usize>,
}

/// Flatten both sections into display rows, sorted by `mode`
pub fn list_rows(doc: &Document, mode: SortOrder, today: NaiveDate) -> Vec<ListRow<'_>> {
    let mut rows = Vec::new();
    for section in [Section::Pending, Section::Completed] {
        let todos = sort_todos(
            doc.todos.iter().filter(|t| t.section() == section),
            mode,
            today,
        );
        for todo in todos {
            rows.push(ListRow {
                section,
                depth: 0,
                is_last: false,
                todo,
                subtask_index: None,
            });

            let mut subtasks: Vec<(usize, u32)> = todo
                .subtasks
                .iter()
                .enumerate()
                .map(|(idx, st)| (idx, st.order))
                .collect();
            subtasks.sort_by_key(|(_, order)| *order);
            let count = subtasks.len();
            for (pos, (idx, _)) in subtasks.into_iter().enumerate() {
                rows.push(ListRow {
                    section,
                    depth: 1,
                    is_last: pos + 1 == count,
                    todo,
                    subtask_index: Some(idx),
                });
            }
        }
    }
    rows
}

/// Tree connector drawn before a subtask row
pub fn tree_connector(is_last: bool) -> &'static str {
    if is_last {
        "└─"
    } else {
        "├─"
    }
}

/// "done/total" for todos with subtasks, e.g. "2/3"
pub fn subtask_progress(todo: &Todo) -> Option<String> {
    if todo.subtasks.is_empty() {
        return None;
    }
    Some(format!(
        "{}/{}",
        todo.completed_subtask_count(),
        todo.subtasks.len()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SubTask, TodoId};

    fn doc() -> Document {
        let mut doc = Document::default();
        let mut groceries = Todo::new("Buy Groceries".to_string(), None, 0);
        groceries.id = TodoId::from("g");
        groceries.add_subtask(SubTask::new(TodoId::from("g"), "milk".to_string(), 0));
        groceries.add_subtask(SubTask::new(TodoId::from("g"), "Oat milk".to_string(), 1));
        let mut call = Todo::new("Call plumber".to_string(), None, 0);
        call.id = TodoId::from("c");
        call.completed = true;
        doc.todos = vec![groceries, call];
        doc
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let doc = doc();
        let hits = search(&doc, "GROCER");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].todo.id.as_str(), "g");
        assert_eq!(hits[0].fields, vec![MatchField::Content]);

        let hits = search(&doc, "milk");
        assert_eq!(hits[0].fields, vec![MatchField::Subtask(0), MatchField::Subtask(1)]);
    }

    #[test]
    fn test_empty_query_returns_everything() {
        let doc = doc();
        assert_eq!(search(&doc, "").len(), 2);
        assert_eq!(search(&doc, "   ").len(), 2);
        assert!(search(&doc, "dentist").is_empty());
    }

    #[test]
    fn test_list_rows_nest_subtasks() {
        let doc = doc();
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let rows = list_rows(&doc, SortOrder::Manual, today);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].depth, 0);
        assert_eq!(rows[1].subtask_index, Some(0));
        assert!(!rows[1].is_last);
        assert!(rows[2].is_last);
        assert_eq!(rows[3].section, Section::Completed);
        assert_eq!(tree_connector(rows[2].is_last), "└─");
        assert_eq!(subtask_progress(rows[0].todo).as_deref(), Some("0/2"));
        assert_eq!(subtask_progress(rows[3].todo), None);
    }
}
