use cookie_sync::config::{Config, Preset};
use cookie_sync::utils::UrlUtils;

#[test]
fn test_version() {
    assert!(!cookie_sync::VERSION.is_empty());
}

#[test]
fn test_url_utils_adds_scheme() {
    let url = UrlUtils::validate_url("api.example.com").expect("URL should parse");
    assert_eq!(url.scheme(), "https");
}

#[test]
fn test_default_config_is_valid() {
    Config::default().validate().expect("default config");
    Config::preset(Preset::Receiver)
        .validate()
        .expect("receiver preset");
}
