//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DEEPAGENT__*` 覆盖（双下划线表示嵌套，如 `DEEPAGENT__CACHE__DEFAULT_TTL_SECS=60`）。
//! 所有段都有默认值，不提供任何配置文件也能运行。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub agent: AgentSection,
    pub cache: CacheSection,
    pub files: FilesSection,
    pub delegation: DelegationSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名与默认日志级别（RUST_LOG 优先）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub log_level: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "deepagent".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// [agent] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 迭代上限，达到后由 validate 报告
    pub max_iterations: u32,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self { max_iterations: 50 }
    }
}

/// [cache] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// 未指定 TTL 时的默认存活时间（秒）
    pub default_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self { default_ttl_secs: 900 }
    }
}

/// [files] 段：虚拟文件数量与单文件大小上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesSection {
    pub max_files: usize,
    /// 字节
    pub max_file_size: usize,
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            max_files: 100,
            max_file_size: 1024 * 1024,
        }
    }
}

/// [delegation] 段：单次专家调用超时与并发度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DelegationSection {
    pub timeout_secs: u64,
    /// 同时运行的专家数；1 表示严格串行
    pub max_concurrent: usize,
}

impl Default for DelegationSection {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            max_concurrent: 1,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）；delegate 工具另按 delegation.timeout_secs 放宽
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self { tool_timeout_secs: 30 }
    }
}

/// 从 config 目录加载配置，环境变量 DEEPAGENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 DEEPAGENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DEEPAGENT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置；已创建的会话不受影响，新会话使用新值
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
