use repokit_core::config::{ConfigError, ConfigProperties, ConfigValue, RepoConfig};
use serial_test::serial;

#[test]
fn test_empty_config() {
    let config = RepoConfig::empty();
    assert!(config.get::<String>("nonexistent").is_err());
}

#[test]
fn test_set_and_get_is_case_insensitive() {
    let mut config = RepoConfig::empty();
    config.set("repository.criteria.params.orderBy", ConfigValue::String("sort".into()));
    assert_eq!(
        config.get::<String>("repository.criteria.params.orderBy").unwrap(),
        "sort"
    );
    assert!(config.contains_key("REPOSITORY.criteria.params.ORDERBY"));
}

#[test]
fn test_get_or_default() {
    let config = RepoConfig::empty();
    assert_eq!(config.get_or("missing", 42i64), 42);
}

#[test]
fn test_type_conversions() {
    let mut config = RepoConfig::empty();
    config.set("int_val", ConfigValue::Integer(42));
    config.set("bool_val", ConfigValue::String("yes".into()));
    config.set("null_val", ConfigValue::Null);

    assert_eq!(config.get::<i64>("int_val").unwrap(), 42);
    assert_eq!(config.get::<u64>("int_val").unwrap(), 42);
    assert!(config.get::<bool>("bool_val").unwrap());
    assert_eq!(config.get::<String>("int_val").unwrap(), "42");
    assert!(config.get::<Option<String>>("null_val").unwrap().is_none());
}

#[test]
fn test_type_mismatch() {
    let mut config = RepoConfig::empty();
    config.set("name", ConfigValue::String("abc".into()));
    let err = config.get::<i64>("name").unwrap_err();
    assert!(matches!(err, ConfigError::TypeMismatch { expected: "i64", .. }));
}

#[test]
fn test_flatten_yaml() {
    let yaml = r#"
repository:
  criteria:
    params:
      orderBy: "order"
      sortedBy: "direction"
  fields:
    - "id"
    - "name"
"#;
    let config = RepoConfig::from_yaml_str(yaml, "test").unwrap();
    assert_eq!(
        config.get::<String>("repository.criteria.params.orderBy").unwrap(),
        "order"
    );
    assert_eq!(
        config.get::<String>("repository.criteria.params.sortedBy").unwrap(),
        "direction"
    );
    let fields: Vec<String> = config.get("repository.fields").unwrap();
    assert_eq!(fields, vec!["id", "name"]);
}

struct PoolSettings {
    size: i64,
    url: String,
}

impl ConfigProperties for PoolSettings {
    fn prefix() -> &'static str {
        "database"
    }

    fn from_config(config: &RepoConfig) -> Result<Self, ConfigError> {
        Ok(PoolSettings {
            size: config.get_or("database.pool.size", 10),
            url: config.get("database.url")?,
        })
    }
}

#[test]
fn test_typed_section() {
    let config = RepoConfig::from_yaml_str("database:\n  url: sqlite::memory:\n", "test").unwrap();
    let pool: PoolSettings = config.section().unwrap();
    assert_eq!(pool.size, 10);
    assert_eq!(pool.url, "sqlite::memory:");
    assert!(RepoConfig::empty().section::<PoolSettings>().is_err());
}

#[test]
#[serial]
fn test_load_profile_overrides_base() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("application.yaml"),
        "repository:\n  default:\n    orderBy: id\n    sortedBy: asc\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("application-prod.yaml"),
        "repository:\n  default:\n    sortedBy: desc\n",
    )
    .unwrap();

    let config = RepoConfig::load_from(dir.path(), "prod").unwrap();
    assert_eq!(config.profile(), "prod");
    assert_eq!(config.get::<String>("repository.default.orderBy").unwrap(), "id");
    assert_eq!(config.get::<String>("repository.default.sortedBy").unwrap(), "desc");
}

#[test]
#[serial]
fn test_env_var_overrides_yaml() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("application.yaml"),
        "repository:\n  criteria:\n    params:\n      orderBy: orderBy\n",
    )
    .unwrap();

    std::env::set_var("REPOSITORY_CRITERIA_PARAMS_ORDERBY", "sort");
    let config = RepoConfig::load_from(dir.path(), "dev");
    std::env::remove_var("REPOSITORY_CRITERIA_PARAMS_ORDERBY");

    assert_eq!(
        config
            .unwrap()
            .get::<String>("repository.criteria.params.orderBy")
            .unwrap(),
        "sort"
    );
}

#[test]
#[serial]
fn test_dotenv_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".env"), "REPOKIT_TEST_DOTENV_KEY=from-dotenv\n").unwrap();

    let config = RepoConfig::load_from(dir.path(), "dev").unwrap();
    std::env::remove_var("REPOKIT_TEST_DOTENV_KEY");

    assert_eq!(
        config.get::<String>("repokit.test.dotenv.key").unwrap(),
        "from-dotenv"
    );
}
