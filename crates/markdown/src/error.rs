use thiserror::Error;

pub type Result<T> = std::result::Result<T, MarkdownError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkdownError {
    #[error("Section with anchor '{anchor}' not found")]
    SectionNotFound { anchor: String },

    #[error("Invalid anchor '{0}'")]
    InvalidAnchor(String),

    #[error("Invalid frontmatter: {0}")]
    InvalidFrontmatter(String),

    #[error("Document has no frontmatter block")]
    MissingFrontmatter,
}
