use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 调用方传入的术语列表有误
    #[error("术语列表错误: {0}")]
    TermList(#[from] TermListError),
    /// 本地持久化存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 生成服务错误
    #[error("生成服务错误: {0}")]
    Generation(#[from] GenerationError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 调度任务异常终止
    #[error("调度任务异常终止: {0}")]
    RunAborted(String),
}

/// 术语列表错误
#[derive(Debug, Error)]
pub enum TermListError {
    /// 术语为空或只包含空白
    #[error("第 {index} 个术语为空")]
    BlankTerm { index: usize },
    /// 读取术语文件失败
    #[error("读取术语文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 读取失败
    #[error("读取 {key} 失败: {source}")]
    ReadFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入失败
    #[error("写入 {key} 失败: {source}")]
    WriteFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },
    /// 序列化 / 反序列化失败
    #[error("{key} 的数据格式错误: {source}")]
    Corrupted {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 生成服务错误
#[derive(Debug, Error)]
pub enum GenerationError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 返回内容无法解析
    #[error("无法解析LLM返回的解释 (响应: {response}): {source}")]
    ResponseParseFailed {
        response: String,
        #[source]
        source: serde_json::Error,
    },
    /// 其他服务端错误（测试替身、代理层等使用）
    #[error("{0}")]
    Service(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 数值必须为正
    #[error("配置项 {var_name} 必须大于 0")]
    MustBePositive { var_name: String },
    /// 最小值大于最大值
    #[error("最小批次大小 {min} 大于最大批次大小 {max}")]
    InvalidRange { min: usize, max: usize },
    /// 候选批次大小非法
    #[error("候选批次大小非法: {sizes:?}")]
    InvalidCandidateSizes { sizes: Vec<usize> },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建存储读取错误
    pub fn store_read_failed(key: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Store(StoreError::ReadFailed {
            key: key.into(),
            source,
        })
    }

    /// 创建存储写入错误
    pub fn store_write_failed(key: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Store(StoreError::WriteFailed {
            key: key.into(),
            source,
        })
    }

    /// 创建存储数据格式错误
    pub fn store_corrupted(key: impl Into<String>, source: serde_json::Error) -> Self {
        AppError::Store(StoreError::Corrupted {
            key: key.into(),
            source,
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Generation(GenerationError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建通用的生成服务错误
    pub fn service(message: impl Into<String>) -> Self {
        AppError::Generation(GenerationError::Service(message.into()))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
