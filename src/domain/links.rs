use regex::Regex;
use std::sync::OnceLock;

/// What a detected span points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// `http(s)://...` or `www....`
    Url,
    /// Windows drive path (`C:\...`) or UNC share (`\\server\...`)
    Path,
}

/// A link found inside todo content. `start`/`end` are byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub kind: LinkKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Link {
    /// Target suitable for opening: bare `www.` hosts get a scheme
    pub fn target(&self) -> String {
        match self.kind {
            LinkKind::Url if self.text.starts_with("www.") => format!("https://{}", self.text),
            _ => self.text.clone(),
        }
    }
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(https?://[^\s]+)|(www\.[^\s]+)").expect("url pattern is valid")
    })
}

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z]:\\[\\\w\s\-\.]+)|(\\\\[\w\-\.]+\\[\\\w\s\-\.]+)")
            .expect("path pattern is valid")
    })
}

fn find(re: &Regex, kind: LinkKind, text: &str) -> Vec<Link> {
    re.find_iter(text)
        .map(|m| Link {
            kind,
            text: m.as_str().trim_end().to_string(),
            start: m.start(),
            end: m.start() + m.as_str().trim_end().len(),
        })
        .collect()
}

/// All URLs and paths in `text`, ordered by position
pub fn detect_links(text: &str) -> Vec<Link> {
    let mut links = find(url_regex(), LinkKind::Url, text);
    links.extend(find(path_regex(), LinkKind::Path, text));
    links.sort_by_key(|l| l.start);
    links
}

pub fn has_links(text: &str) -> bool {
    url_regex().is_match(text) || path_regex().is_match(text)
}

pub fn extract_urls(text: &str) -> Vec<String> {
    find(url_regex(), LinkKind::Url, text)
        .into_iter()
        .map(|l| l.text)
        .collect()
}

pub fn extract_paths(text: &str) -> Vec<String> {
    find(path_regex(), LinkKind::Path, text)
        .into_iter()
        .map(|l| l.text)
        .collect()
}
