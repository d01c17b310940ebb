//! 配置模块，负责加载JSON配置文件

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::Dialect;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {0}")]
    Missing(String),

    #[error("无法读取配置文件 {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("无法解析JSON配置文件 {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("配置项无效: {0}")]
    Invalid(String),
}

/// 用户名的显示顺序，决定按用户排序时使用的列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserNameFormat {
    #[default]
    FirstnameLastname,
    LastnameFirstname,
    Firstname,
    Login,
}

impl UserNameFormat {
    /// 排序时依次使用的 users 表列
    pub fn order_columns(self) -> &'static [&'static str] {
        match self {
            UserNameFormat::FirstnameLastname => &["firstname", "lastname", "id"],
            UserNameFormat::LastnameFirstname => &["lastname", "firstname", "id"],
            UserNameFormat::Firstname => &["firstname", "id"],
            UserNameFormat::Login => &["login", "id"],
        }
    }
}

/// 私有备注对 "updated_by" 类过滤器的影响
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivateNotesPolicy {
    /// 当前用户看不到的私有备注不计入
    #[default]
    Hidden,
    /// 私有备注始终计入
    Counted,
}

/// 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dialect: Dialect,
    /// 逻辑表名到数据库表名的映射
    pub table_mapping: HashMap<String, String>,
    /// 一周的第一天，1 = 周一 … 7 = 周日
    pub first_day_of_week: u8,
    pub user_name_format: UserNameFormat,
    /// 时间戳在数据库中存储使用的时区
    pub storage_time_zone: Tz,
    pub display_subprojects_issues: bool,
    pub issue_group_assignment: bool,
    pub default_columns: Vec<String>,
    pub private_notes: PrivateNotesPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            table_mapping: HashMap::new(),
            first_day_of_week: 1,
            user_name_format: UserNameFormat::default(),
            storage_time_zone: Tz::UTC,
            display_subprojects_issues: true,
            issue_group_assignment: false,
            default_columns: ["tracker", "status", "priority", "subject", "assigned_to", "updated_on"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            private_notes: PrivateNotesPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let display = path_ref.display().to_string();

        // 检查文件是否存在
        if !path_ref.exists() {
            return Err(ConfigError::Missing(display));
        }

        // 读取文件内容
        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: display, source })?;
        config.validate()?;
        Ok(config)
    }

    /// 从JSON字符串加载配置
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            serde_json::from_str(content).map_err(|source| ConfigError::Parse {
                path: "<inline>".to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=7).contains(&self.first_day_of_week) {
            return Err(ConfigError::Invalid(format!(
                "first_day_of_week 必须在 1 到 7 之间, 实际为 {}",
                self.first_day_of_week
            )));
        }
        Ok(())
    }

    /// 获取逻辑表对应的实际表名，如果不存在映射则原样返回
    pub fn table_name(&self, logical: &str) -> String {
        self.table_mapping
            .get(logical)
            .cloned()
            .unwrap_or_else(|| logical.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_valid_json_config() {
        let temp_file = std::env::temp_dir().join("tracker_query_config_valid.json");
        let mut file = fs::File::create(&temp_file).unwrap();
        writeln!(
            file,
            r#"{{
                "dialect": "sqlite",
                "table_mapping": {{ "issues": "tracker_issues" }},
                "first_day_of_week": 7,
                "user_name_format": "lastname_firstname",
                "storage_time_zone": "Europe/Paris"
            }}"#
        )
        .unwrap();

        let config = EngineConfig::from_json_file(&temp_file).unwrap();
        assert_eq!(config.dialect, Dialect::Sqlite);
        assert_eq!(config.table_name("issues"), "tracker_issues");
        assert_eq!(config.table_name("projects"), "projects");
        assert_eq!(config.first_day_of_week, 7);
        assert_eq!(config.user_name_format, UserNameFormat::LastnameFirstname);
        assert_eq!(config.storage_time_zone, chrono_tz::Europe::Paris);
        // 未配置的键使用默认值
        assert!(config.display_subprojects_issues);

        fs::remove_file(&temp_file).ok();
    }

    #[test]
    fn test_invalid_json_config() {
        let temp_file = std::env::temp_dir().join("tracker_query_config_invalid.json");
        let mut file = fs::File::create(&temp_file).unwrap();
        writeln!(file, "invalid json").unwrap();

        let result = EngineConfig::from_json_file(&temp_file);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));

        fs::remove_file(&temp_file).ok();
    }

    #[test]
    fn test_missing_file() {
        let result = EngineConfig::from_json_file("non_existent_file.json");
        assert!(matches!(result, Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_first_day_of_week_out_of_range() {
        let result = EngineConfig::from_json_str(r#"{ "first_day_of_week": 9 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.dialect, Dialect::Postgres);
        assert_eq!(config.table_name("issues"), "issues");
        assert_eq!(config.first_day_of_week, 1);
        assert_eq!(
            UserNameFormat::LastnameFirstname.order_columns(),
            &["lastname", "firstname", "id"]
        );
    }
}
