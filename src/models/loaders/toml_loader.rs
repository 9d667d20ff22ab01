use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::error::{AppResult, TermListError};
use crate::models::term::{SubjectContext, Term};

/// 术语文件
///
/// ```toml
/// subject = "数据结构"
/// title = "第三课：栈与队列"
/// terms = ["栈", "队列", "双端队列"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermList {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub terms: Vec<Term>,
}

impl TermList {
    /// 生成服务使用的学科上下文
    pub fn context(&self) -> SubjectContext {
        SubjectContext {
            subject: self.subject.clone(),
            title: self.title.clone(),
        }
    }
}

/// 从 TOML 文件加载术语列表
pub async fn load_term_list(path: &Path) -> AppResult<TermList> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| TermListError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;

    let list: TermList = toml::from_str(&content).map_err(|source| TermListError::TomlParseFailed {
        path: path.display().to_string(),
        source,
    })?;

    tracing::info!("成功加载 {} 个术语: {}", list.terms.len(), path.display());

    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[tokio::test]
    async fn test_load_term_list() {
        let path = std::env::temp_dir().join(format!("term_list_{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "subject = \"数据结构\"\ntitle = \"栈与队列\"\nterms = [\"栈\", \"队列\"]\n",
        )
        .unwrap();

        let list = load_term_list(&path).await.unwrap();
        assert_eq!(list.terms, vec!["栈".to_string(), "队列".to_string()]);
        assert_eq!(list.context().title.as_deref(), Some("栈与队列"));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_missing_file_is_term_list_error() {
        let result = load_term_list(Path::new("/definitely/not/here.toml")).await;
        assert!(matches!(
            result,
            Err(AppError::TermList(TermListError::ReadFailed { .. }))
        ));
    }
}
