use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub firebase: FirebaseConfig,
    pub openrouter: OpenRouterConfig,
    pub paystack: PaystackConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 允许的跨域来源；为空表示放开所有来源
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseConfig {
    pub project_id: String,
    /// 服务账号 JSON 路径；为空时走 GCE metadata server 取 token
    #[serde(default)]
    pub credentials_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    pub api_key: String,
    #[serde(default = "default_openrouter_base_url")]
    pub base_url: String,
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_app_title")]
    pub app_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaystackConfig {
    pub secret_key: String,
    pub public_key: String,
    #[serde(default = "default_paystack_base_url")]
    pub base_url: String,
    /// 移动端未传 callback_url 时使用
    #[serde(default = "default_callback_url")]
    pub default_callback_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub conversation_list_limit: u64,
    /// 订阅过期扫描间隔（秒）
    pub expiry_sweep_interval_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
            conversation_list_limit: 50,
            expiry_sweep_interval_secs: 3600,
        }
    }
}

fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_referer() -> String {
    "https://zlmaai.com".to_string()
}

fn default_app_title() -> String {
    "Zlma AI".to_string()
}

fn default_paystack_base_url() -> String {
    "https://api.paystack.co".to_string()
}

fn default_callback_url() -> String {
    "https://zlmaai.com/payment/callback".to_string()
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => {
                toml::from_str(&config_str).map_err(|e| format!("解析配置文件失败: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Self::from_env()?,
            Err(e) => {
                return Err(format!("无法读取配置文件 {config_path}: {e}").into());
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        fn get_env(name: &str) -> Option<String> {
            env::var(name).ok()
        }
        fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
            env::var(name)
                .ok()
                .and_then(|v| v.parse::<T>().ok())
                .unwrap_or(default)
        }

        // 数据库 URL 与 Firebase 项目在无配置文件时必须提供
        let database_url = get_env("DATABASE_URL")
            .ok_or("缺少 DATABASE_URL 环境变量，且未找到配置文件 config.toml")?;
        let project_id = get_env("FIREBASE_PROJECT_ID")
            .ok_or("缺少 FIREBASE_PROJECT_ID 环境变量，且未找到配置文件 config.toml")?;

        Ok(Config {
            server: ServerConfig {
                host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: get_env_parse("PORT", 8080u16),
                cors_origins: get_env("CORS_ORIGINS")
                    .map(|v| split_origins(&v))
                    .unwrap_or_default(),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
            },
            firebase: FirebaseConfig {
                project_id,
                credentials_path: get_env("GOOGLE_APPLICATION_CREDENTIALS"),
            },
            openrouter: OpenRouterConfig {
                api_key: get_env("OPENROUTER_API_KEY").unwrap_or_default(),
                base_url: default_openrouter_base_url(),
                referer: default_referer(),
                app_title: default_app_title(),
            },
            paystack: PaystackConfig {
                secret_key: get_env("PAYSTACK_SECRET_KEY").unwrap_or_default(),
                public_key: get_env("PAYSTACK_PUBLIC_KEY").unwrap_or_default(),
                base_url: default_paystack_base_url(),
                default_callback_url: get_env("PAYSTACK_CALLBACK_URL")
                    .unwrap_or_else(default_callback_url),
            },
            chat: ChatConfig::default(),
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("PORT")
            && let Ok(p) = v.parse()
        {
            self.server.port = p;
        }
        if let Ok(v) = env::var("CORS_ORIGINS") {
            self.server.cors_origins = split_origins(&v);
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            self.database.max_connections = mc;
        }
        if let Ok(v) = env::var("FIREBASE_PROJECT_ID") {
            self.firebase.project_id = v;
        }
        if let Ok(v) = env::var("GOOGLE_APPLICATION_CREDENTIALS") {
            self.firebase.credentials_path = Some(v);
        }
        if let Ok(v) = env::var("OPENROUTER_API_KEY") {
            self.openrouter.api_key = v;
        }
        if let Ok(v) = env::var("PAYSTACK_SECRET_KEY") {
            self.paystack.secret_key = v;
        }
        if let Ok(v) = env::var("PAYSTACK_PUBLIC_KEY") {
            self.paystack.public_key = v;
        }
        if let Ok(v) = env::var("PAYSTACK_CALLBACK_URL") {
            self.paystack.default_callback_url = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_toml() {
        let raw = r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [database]
            url = "sqlite::memory:"
            max_connections = 1

            [firebase]
            project_id = "zlma-test"

            [openrouter]
            api_key = "or-key"

            [paystack]
            secret_key = "sk_test"
            public_key = "pk_test"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.firebase.credentials_path, None);
        assert_eq!(config.openrouter.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.openrouter.app_title, "Zlma AI");
        assert_eq!(config.paystack.base_url, "https://api.paystack.co");
        assert_eq!(config.chat.conversation_list_limit, 50);
        assert_eq!(config.chat.expiry_sweep_interval_secs, 3600);
    }

    #[test]
    fn test_missing_section_is_an_error() {
        let raw = r#"
            [server]
            host = "127.0.0.1"
            port = 9000
        "#;
        assert!(toml::from_str::<Config>(raw).is_err());
    }

    #[test]
    fn test_split_origins() {
        assert_eq!(
            split_origins("https://a.test, https://b.test,,"),
            vec!["https://a.test".to_string(), "https://b.test".to_string()]
        );
        assert!(split_origins("").is_empty());
    }
}
