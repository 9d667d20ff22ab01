//! LLM 服务 - 业务能力层
//!
//! 只负责“为一批术语生成解释”能力，不关心批次规划与重试
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use std::collections::HashMap;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, GenerationError};
use crate::models::{ExplanationMap, SubjectContext, Term};
use crate::services::generator::ExplanationGenerator;
use crate::utils::logging::truncate_text;

const SYSTEM_MESSAGE: &str = "你是一名耐心的学科助教，负责为课程文章中出现的专业术语编写简短的提示解释。\
                              解释要准确、通俗，适合在鼠标悬停时阅读。";

/// LLM 服务
///
/// 职责：
/// - 一次请求为一批术语生成解释
/// - 把模型输出解析成 术语 → 解释
/// - 不做缓存、不做重试
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }

    /// 为一批术语请求解释
    pub async fn explain_terms(
        &self,
        terms: &[Term],
        context: &SubjectContext,
    ) -> AppResult<ExplanationMap> {
        if terms.is_empty() {
            return Ok(ExplanationMap::new());
        }

        debug!("调用 LLM API，模型: {}，术语数: {}", self.model_name, terms.len());

        let user_message = build_user_message(terms, context);
        let model = self.model_name.as_str();

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_MESSAGE)
            .build()
            .map_err(|e| AppError::llm_api_failed(model, e))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message.as_str())
            .build()
            .map_err(|e| AppError::llm_api_failed(model, e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(0.3)
            .max_tokens(256u32 + 160u32 * terms.len() as u32)
            .build()
            .map_err(|e| AppError::llm_api_failed(model, e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::llm_api_failed(model, e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| GenerationError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        let explanations = parse_explanations(&content, terms)?;
        debug!(
            "LLM API 调用成功，返回 {}/{} 条解释",
            explanations.len(),
            terms.len()
        );

        Ok(explanations)
    }
}

impl ExplanationGenerator for LlmService {
    fn generate<'a>(
        &'a self,
        terms: &'a [Term],
        context: &'a SubjectContext,
    ) -> BoxFuture<'a, AppResult<ExplanationMap>> {
        self.explain_terms(terms, context).boxed()
    }
}

/// 构建用户消息
fn build_user_message(terms: &[Term], context: &SubjectContext) -> String {
    let terms_json = serde_json::to_string(terms).unwrap_or_default();
    let title = context.title.as_deref().unwrap_or("（无）");

    format!(
        r#"课程学科：{}
文章标题：{}

请为下列术语分别写一段简短解释（不超过两句话）：
{}

只返回一个 JSON 对象，键为术语原文（保持原样，不要翻译或改写），值为对应的解释，不要返回任何其他内容。"#,
        context.subject, title, terms_json
    )
}

/// 取出 Markdown 代码块中的内容，没有代码块时原样返回
fn strip_code_fence(response: &str) -> &str {
    if let Ok(re) = Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```") {
        if let Some(body) = re.captures(response).and_then(|caps| caps.get(1)) {
            return body.as_str();
        }
    }
    response
}

/// 解析 LLM 返回的解释
///
/// - 去掉可能存在的 Markdown 代码块
/// - 只保留请求中的术语；键名大小写不一致时映射回请求的写法
/// - 丢弃空解释
pub fn parse_explanations(response: &str, requested: &[Term]) -> AppResult<ExplanationMap> {
    let body = strip_code_fence(response).trim();

    let parsed: HashMap<String, JsonValue> =
        serde_json::from_str(body).map_err(|source| GenerationError::ResponseParseFailed {
            response: truncate_text(response, 200),
            source,
        })?;

    let by_lowercase: HashMap<String, &Term> = requested
        .iter()
        .map(|term| (term.to_lowercase(), term))
        .collect();

    let mut explanations = ExplanationMap::new();
    for (key, value) in parsed {
        let Some(text) = value.as_str().map(str::trim).filter(|t| !t.is_empty()) else {
            debug!("跳过空解释或非文本解释: {}", key);
            continue;
        };

        let term = if requested.contains(&key) {
            Some(key.clone())
        } else {
            by_lowercase
                .get(&key.trim().to_lowercase())
                .map(|t| (*t).clone())
        };

        match term {
            Some(term) => {
                explanations.entry(term).or_insert_with(|| text.to_string());
            }
            None => debug!("忽略未请求的术语: {}", key),
        }
    }

    Ok(explanations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requested(terms: &[&str]) -> Vec<Term> {
        terms.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_parse_plain_json() {
        let terms = requested(&["栈", "队列"]);
        let result = parse_explanations(r#"{"栈": "后进先出的线性表", "队列": "先进先出"}"#, &terms).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result["栈"], "后进先出的线性表");
    }

    #[test]
    fn test_parse_code_fence() {
        let terms = requested(&["Closure"]);
        let response = "好的，结果如下：\n```json\n{\"Closure\": \"A function with captured state.\"}\n```";
        let result = parse_explanations(response, &terms).unwrap();

        assert_eq!(result["Closure"], "A function with captured state.");
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```\n{\"a\": \"b\"}\n```"), "{\"a\": \"b\"}");
        assert_eq!(strip_code_fence("前言 ```json {} ``` 结尾"), "{}");
        assert_eq!(strip_code_fence("{\"a\": \"b\"}"), "{\"a\": \"b\"}");
    }

    #[test]
    fn test_parse_maps_case_back_to_request() {
        let terms = requested(&["Borrow Checker"]);
        let result = parse_explanations(r#"{"borrow checker": "检查引用生命周期"}"#, &terms).unwrap();

        assert!(result.contains_key("Borrow Checker"));
    }

    #[test]
    fn test_parse_drops_unrequested_and_empty() {
        let terms = requested(&["栈", "堆"]);
        let result =
            parse_explanations(r#"{"栈": "后进先出", "堆": "  ", "树": "层级结构", "图": 3}"#, &terms)
                .unwrap();

        assert_eq!(result.len(), 1);
        assert!(result.contains_key("栈"));
    }

    #[test]
    fn test_parse_invalid_json_is_error() {
        let terms = requested(&["栈"]);
        let result = parse_explanations("抱歉，我无法回答", &terms);

        assert!(matches!(
            result,
            Err(AppError::Generation(GenerationError::ResponseParseFailed { .. }))
        ));
    }

    #[test]
    fn test_user_message_lists_terms() {
        let message = build_user_message(
            &requested(&["栈", "队列"]),
            &SubjectContext::new("数据结构").with_title("栈与队列"),
        );

        assert!(message.contains("数据结构"));
        assert!(message.contains("栈与队列"));
        assert!(message.contains(r#"["栈","队列"]"#));
    }

    /// 测试真实 LLM 调用
    ///
    /// 运行方式：
    /// ```bash
    /// LLM_API_KEY=... cargo test test_live_explain_terms -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_live_explain_terms() {
        let _ = tracing_subscriber::fmt::try_init();

        let service = LlmService::new(&Config::from_env());
        let terms = requested(&["所有权", "借用", "生命周期"]);
        let context = SubjectContext::new("Rust 编程");

        match service.explain_terms(&terms, &context).await {
            Ok(explanations) => {
                println!("\n========== LLM 响应 ==========");
                for (term, explanation) in &explanations {
                    println!("{}: {}", term, explanation);
                }
                println!("==============================\n");
                assert!(!explanations.is_empty());
            }
            Err(e) => panic!("LLM 调用失败: {}", e),
        }
    }
}
