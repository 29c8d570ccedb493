use std::env;
use std::path::PathBuf;

use anyhow::Result;

use crate::import::MachineIdKey;

pub const DB_ENV: &str = "RIGNET_DB";
pub const DATA_DIR_ENV: &str = "RIGNET_DATA_DIR";
pub const EQUIPMENT_TYPE_ENV: &str = "RIGNET_EQUIPMENT_TYPE";
pub const OPERATOR_ENV: &str = "RIGNET_OPERATOR";
pub const MACHINE_ID_KEY_ENV: &str = "RIGNET_MACHINE_ID_KEY";

pub const DEFAULT_EQUIPMENT_TYPE: &str = "MINING_EQUIPMENT";
const APP_DIR: &str = "rignet";
const DB_FILE: &str = "rignet.sqlite3";

/// Knobs applied to every equipment created by one import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    pub equipment_type: String,
    pub assigned_by: Option<String>,
    pub machine_id_key: MachineIdKey,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            equipment_type: DEFAULT_EQUIPMENT_TYPE.to_string(),
            assigned_by: None,
            machine_id_key: MachineIdKey::Exact,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub logs_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub default_equipment_type: String,
    pub assigned_by: Option<String>,
    pub machine_id_key: MachineIdKey,
}

impl AppConfig {
    /// Resolves paths and defaults from the environment.
    pub fn from_env() -> Result<Self> {
        Self::resolve(|key| env::var(key).ok())
    }

    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let data_dir = match non_empty(DATA_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .or_else(|| env::current_dir().ok())
                .ok_or_else(|| anyhow::anyhow!("failed to resolve application data directory"))?
                .join(APP_DIR),
        };
        let db_path = non_empty(DB_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DB_FILE));

        let machine_id_key = match non_empty(MACHINE_ID_KEY_ENV) {
            Some(raw) => MachineIdKey::parse(&raw).ok_or_else(|| {
                anyhow::anyhow!("{MACHINE_ID_KEY_ENV} must be 'exact' or 'case-insensitive', got '{raw}'")
            })?,
            None => MachineIdKey::Exact,
        };

        Ok(Self {
            db_path,
            logs_dir: data_dir.join("logs"),
            reports_dir: data_dir.join("reports"),
            default_equipment_type: non_empty(EQUIPMENT_TYPE_ENV)
                .unwrap_or_else(|| DEFAULT_EQUIPMENT_TYPE.to_string()),
            assigned_by: non_empty(OPERATOR_ENV),
            machine_id_key,
        })
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            equipment_type: self.default_equipment_type.clone(),
            assigned_by: self.assigned_by.clone(),
            machine_id_key: self.machine_id_key,
        }
    }
}
