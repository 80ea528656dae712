use scale_config::load_toml;

#[test]
fn rejects_trigger_below_release() {
    let toml = r#"
[pins]
hx711_dt = 5
hx711_sck = 6

[capture]
trigger_kg = 2.0
release_kg = 3.0
"#;

    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg
        .validate()
        .expect_err("should reject trigger_kg <= release_kg");
    assert!(
        format!("{err}")
            .to_lowercase()
            .contains("trigger_kg must be greater than")
    );
}

#[test]
fn accepts_defaulted_config() {
    let toml = r#"
[pins]
hx711_dt = 5
hx711_sck = 6
"#;

    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
}

#[test]
fn rejects_zero_gain_pulses() {
    let toml = r#"
[pins]
hx711_dt = 5
hx711_sck = 6

[hardware]
gain_pulses = 0
"#;

    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg
        .validate()
        .expect_err("should reject out-of-range gain_pulses");
    assert!(
        format!("{err}")
            .to_lowercase()
            .contains("gain_pulses must be one of")
    );
}

#[test]
fn rejects_inverted_detector_clamp() {
    let toml = r#"
[pins]
hx711_dt = 5
hx711_sck = 6

[detector]
deriv_clamp = [0.05, 0.01]
"#;

    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg
        .validate()
        .expect_err("should reject lo >= hi in deriv_clamp");
    assert!(
        format!("{err}")
            .to_lowercase()
            .contains("deriv_clamp must have lo < hi")
    );
}

#[test]
fn accepts_table_form_clamp_range() {
    let toml = r#"
[pins]
hx711_dt = 5
hx711_sck = 6

[detector.std_clamp]
lo = 0.05
hi = 0.25
"#;

    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("table-form clamp range should parse");
    assert_eq!(cfg.detector.std_clamp, (0.05, 0.25));
}
