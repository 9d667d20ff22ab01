use crate::error::{AppResult, ConfigError};

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    // --- 批次规划 ---
    /// 第一批的术语数量（保证首批结果尽快出现）
    pub first_batch_size: usize,
    /// 最小批次大小（重试拆分的下限）
    pub min_batch_size: usize,
    /// 最大批次大小
    pub max_batch_size: usize,
    /// 探索阶段的候选批次大小
    pub candidate_batch_sizes: Vec<usize>,
    /// 一个候选大小被视为“已评估”所需的样本数
    pub min_samples_per_size: u32,
    /// 结束探索前需要评估完成的候选大小数量
    pub explored_sizes_required: usize,
    // --- 执行与并发 ---
    /// 最大重试深度
    pub max_retries: u32,
    /// 同时在途的批次数量（不含第一批）
    pub concurrency_limit: usize,
    /// 相邻两次批次启动之间的间隔（毫秒）
    pub launch_delay_ms: u64,
    // --- 持久化 ---
    /// 缓存与统计数据的存放目录
    pub store_dir: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            first_batch_size: 4,
            min_batch_size: 3,
            max_batch_size: 16,
            candidate_batch_sizes: vec![4, 8, 12, 16],
            min_samples_per_size: 3,
            explored_sizes_required: 3,
            max_retries: 2,
            concurrency_limit: 3,
            launch_delay_ms: 200,
            store_dir: ".term_explainer".to_string(),
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            first_batch_size: env_parse("FIRST_BATCH_SIZE").unwrap_or(default.first_batch_size),
            min_batch_size: env_parse("MIN_BATCH_SIZE").unwrap_or(default.min_batch_size),
            max_batch_size: env_parse("MAX_BATCH_SIZE").unwrap_or(default.max_batch_size),
            candidate_batch_sizes: std::env::var("CANDIDATE_BATCH_SIZES").ok().and_then(|v| parse_size_list(&v)).unwrap_or(default.candidate_batch_sizes),
            min_samples_per_size: env_parse("MIN_SAMPLES_PER_SIZE").unwrap_or(default.min_samples_per_size),
            explored_sizes_required: env_parse("EXPLORED_SIZES_REQUIRED").unwrap_or(default.explored_sizes_required),
            max_retries: env_parse("MAX_RETRIES").unwrap_or(default.max_retries),
            concurrency_limit: env_parse("CONCURRENCY_LIMIT").unwrap_or(default.concurrency_limit),
            launch_delay_ms: env_parse("LAUNCH_DELAY_MS").unwrap_or(default.launch_delay_ms),
            store_dir: std::env::var("STORE_DIR").unwrap_or(default.store_dir),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
        }
    }

    /// 检查配置之间的一致性
    pub fn validate(&self) -> AppResult<()> {
        let positive = [
            ("FIRST_BATCH_SIZE", self.first_batch_size),
            ("MIN_BATCH_SIZE", self.min_batch_size),
            ("MAX_BATCH_SIZE", self.max_batch_size),
            ("CONCURRENCY_LIMIT", self.concurrency_limit),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::MustBePositive {
                    var_name: name.to_string(),
                }
                .into());
            }
        }

        if self.min_batch_size > self.max_batch_size {
            return Err(ConfigError::InvalidRange {
                min: self.min_batch_size,
                max: self.max_batch_size,
            }
            .into());
        }

        if self.candidate_batch_sizes.is_empty() || self.candidate_batch_sizes.contains(&0) {
            return Err(ConfigError::InvalidCandidateSizes {
                sizes: self.candidate_batch_sizes.clone(),
            }
            .into());
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(var_name: &str) -> Option<T> {
    std::env::var(var_name).ok().and_then(|v| v.trim().parse().ok())
}

/// 解析逗号分隔的批次大小列表，例如 "4,8,12,16"
fn parse_size_list(value: &str) -> Option<Vec<usize>> {
    let sizes: Option<Vec<usize>> = value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect();
    sizes.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let config = Config {
            min_batch_size: 10,
            max_batch_size: 4,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = Config {
            concurrency_limit: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_size_list() {
        assert_eq!(parse_size_list("4, 8,12"), Some(vec![4, 8, 12]));
        assert_eq!(parse_size_list("4,x"), None);
        assert_eq!(parse_size_list(""), None);
    }
}
