use super::*;

#[test]
fn parses_login_with_flags() {
    let cli = Cli::try_parse_from(["staffid", "login", "--email", "ada@example.com", "--password", "pw"]).unwrap();
    match cli.command {
        Command::Login { email, password } => {
            assert_eq!(email, "ada@example.com");
            assert_eq!(password, "pw");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parses_global_overrides() {
    let cli = Cli::try_parse_from([
        "staffid",
        "--base-url",
        "http://localhost:3000",
        "--session-file",
        "/tmp/s.json",
        "status",
    ])
    .unwrap();
    assert_eq!(cli.base_url.as_deref(), Some("http://localhost:3000"));
    assert_eq!(cli.session_file, Some(PathBuf::from("/tmp/s.json")));
    assert!(matches!(cli.command, Command::Status));
}

#[test]
fn parses_nested_staff_update() {
    let cli =
        Cli::try_parse_from(["staffid", "staff", "update", "abc123", "--department", "Finance", "--data", "{}"]).unwrap();
    let Command::Staff(StaffCommand { command: StaffSubcommand::Update { id, data, fields } }) = cli.command else {
        panic!("expected staff update");
    };
    assert_eq!(id, "abc123");
    assert_eq!(data.as_deref(), Some("{}"));
    assert_eq!(fields.department.as_deref(), Some("Finance"));
}

#[test]
fn staff_update_flags_override_json() {
    let fields = StaffFields { department: Some("Finance".into()), ..StaffFields::default() };
    let update =
        staff_update(fields, Some(r#"{"department":"Ops","jobTitle":"Analyst","unknown":1}"#)).unwrap();
    assert_eq!(update.department.as_deref(), Some("Finance"));
    assert_eq!(update.job_title.as_deref(), Some("Analyst"));
    assert!(update.email.is_none());
}

#[test]
fn staff_update_rejects_bad_json() {
    let err = staff_update(StaffFields::default(), Some("{not json")).unwrap_err();
    assert_eq!(err.code(), "E_INVALID_JSON");
}

#[test]
fn decision_json_reports_redirect_target() {
    let state = AuthState::authenticated("tok".into(), Role::Staff);
    let value = decision_json(Route::AdminHome, guard(Route::AdminHome, &state));
    assert_eq!(
        value,
        json!({ "requested": "/dashboard/admin", "decision": "redirect", "target": "/dashboard/staff" })
    );
}

#[test]
fn decision_json_loading_has_no_target() {
    let value = decision_json(Route::Profile, guard(Route::Profile, &AuthState::bootstrapping()));
    assert_eq!(value["decision"], "loading");
    assert!(value["target"].is_null());
}

#[test]
fn state_json_never_contains_token() {
    let state = AuthState::authenticated("secret-token".into(), Role::Admin);
    let value = state_json(&state);
    assert_eq!(value["phase"], "authenticated");
    assert_eq!(value["role"], "admin");
    assert_eq!(value["home"], "/dashboard/admin");
    assert!(!value.to_string().contains("secret-token"));
}

#[test]
fn state_json_carries_last_error() {
    let state = AuthState::unauthenticated(Some(SessionError::unreachable()));
    let value = state_json(&state);
    assert_eq!(value["authenticated"], false);
    assert_eq!(value["lastError"]["code"], "E_NETWORK_UNREACHABLE");
}

#[test]
fn denied_names_route_path() {
    let err = denied(Route::AdminEmployees, "sign in first");
    assert_eq!(err.to_string(), "/dashboard/admin/employees is not available: sign in first");
    assert_eq!(err.code(), "E_DENIED");
}

#[test]
fn parses_password_reset_from_link() {
    let cli = Cli::try_parse_from([
        "staffid",
        "password",
        "reset",
        "--link",
        "http://localhost:3000/#access_token=abc&type=recovery",
        "--password",
        "hunter22",
        "--confirm",
        "hunter22",
    ])
    .unwrap();
    let Command::Password(PasswordCommand { command: PasswordSubcommand::Reset { link, token, .. } }) = cli.command
    else {
        panic!("expected password reset");
    };
    assert_eq!(reset_token(link.as_deref(), token.as_deref()).unwrap(), "abc");
}

#[test]
fn password_reset_link_and_token_conflict() {
    let parsed = Cli::try_parse_from([
        "staffid", "password", "reset", "--link", "x", "--token", "y", "--password", "p", "--confirm", "p",
    ]);
    assert!(parsed.is_err());
}

#[test]
fn reset_token_rejects_non_recovery_link() {
    let err = reset_token(Some("http://localhost:3000/#access_token=abc&type=signup"), None).unwrap_err();
    assert_eq!(err.code(), "E_INVALID_ARGUMENT");
    assert_eq!(reset_token(None, Some("raw")).unwrap(), "raw");
}

#[test]
fn staff_export_defaults_file_name() {
    let cli = Cli::try_parse_from(["staffid", "staff", "export"]).unwrap();
    let Command::Staff(StaffCommand { command: StaffSubcommand::Export { file } }) = cli.command else {
        panic!("expected staff export");
    };
    assert_eq!(file, PathBuf::from("employees.csv"));
}

#[test]
fn parses_admin_card() {
    let cli = Cli::try_parse_from(["staffid", "card", "admin"]).unwrap();
    assert!(matches!(cli.command, Command::Card(CardCommand { command: CardSubcommand::Admin })));
}
