use std::path::Path;
use std::process::Command;

use repave_core::{AppTarget, PackagePresence, RemovalFailure};

use crate::appx::{
    classify_presence, classify_removal_error, parse_package_query, parse_provisioned_query,
};
use crate::command::run_command;
use crate::winget::{
    build_winget_install_command, build_winget_list_command, parse_winget_version,
    select_latest_installer_dir, winget_reports_installed,
};

fn command_line(command: &Command) -> Vec<String> {
    let mut line = vec![command.get_program().to_string_lossy().into_owned()];
    line.extend(
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned()),
    );
    line
}

fn app_target(install_by_name: bool) -> AppTarget {
    AppTarget {
        id: "9NBLGGH5R558".to_string(),
        name: Some("Microsoft To Do".to_string()),
        source: "msstore".to_string(),
        install_by_name,
    }
}

#[test]
fn run_command_reports_spawn_failures_with_context() {
    let mut command = Command::new("repave-no-such-binary");
    let err = run_command(&mut command, "winget install failed for '9NBLGGH5R558'")
        .expect_err("spawn must fail");
    assert!(err
        .to_string()
        .contains("winget install failed for '9NBLGGH5R558'"));
}

#[test]
fn removal_error_classification_pins_known_hresults() {
    // Literal shapes of the deployment errors Remove-AppxPackage emits.
    let needs_reregistration = "Remove-AppxPackage : Deployment failed with HRESULT: 0x80073CFA, \
         Removal failed. Please contact your software vendor. \
         (Exception from HRESULT: 0x80073CFA)";
    let path_not_found = "Remove-AppxPackage : Deployment failed with HRESULT: 0x80073CF1, \
         Package could not be found.";
    let access_denied = "Remove-AppxPackage : Access is denied.";

    assert_eq!(
        classify_removal_error(needs_reregistration),
        RemovalFailure::NeedsReregistration
    );
    assert_eq!(
        classify_removal_error(path_not_found),
        RemovalFailure::PathNotFound
    );
    assert_eq!(classify_removal_error(access_denied), RemovalFailure::Other);
    assert_eq!(classify_removal_error(""), RemovalFailure::Other);
}

#[test]
fn package_query_parses_absent_result() {
    let state = parse_package_query(r#"{"found":false}"#, "Contoso.Notes").expect("must parse");
    assert_eq!(state.presence, PackagePresence::NotInstalled);
    assert!(state.users.is_empty());
    assert!(state.install_location.is_none());
}

#[test]
fn package_query_parses_installed_result() {
    let raw = r#"{"found":true,"name":"Contoso.Notes","installLocation":"C:\\Program Files\\WindowsApps\\Contoso.Notes_1.4.0.0_x64__8wekyb","users":["S-1-5-21-1111-2222-3333-1001|Installed","S-1-5-18|Staged"]}"#;
    let state = parse_package_query(raw, "Contoso.Notes").expect("must parse");

    assert_eq!(state.name, "Contoso.Notes");
    assert_eq!(state.presence, PackagePresence::Installed);
    assert_eq!(
        state.users,
        vec![
            "S-1-5-21-1111-2222-3333-1001".to_string(),
            "S-1-5-18".to_string()
        ]
    );
    assert_eq!(
        state.install_location.as_deref(),
        Some(Path::new(
            "C:\\Program Files\\WindowsApps\\Contoso.Notes_1.4.0.0_x64__8wekyb"
        ))
    );
}

#[test]
fn system_only_records_classify_as_staged() {
    let records = vec!["S-1-5-18|Installed".to_string()];
    assert_eq!(
        classify_presence(&records).expect("must classify"),
        PackagePresence::SystemStaged
    );
}

#[test]
fn incomplete_user_records_classify_as_staged() {
    // A real account with only a staged record is a half-finished install,
    // not a success.
    let records = vec![
        "S-1-5-21-1111-2222-3333-1001|Staged".to_string(),
        "S-1-5-18|Staged".to_string(),
    ];
    assert_eq!(
        classify_presence(&records).expect("must classify"),
        PackagePresence::SystemStaged
    );
}

#[test]
fn malformed_user_record_is_rejected() {
    let records = vec!["S-1-5-18".to_string()];
    assert!(classify_presence(&records).is_err());
}

#[test]
fn package_query_rejects_non_json_output() {
    assert!(parse_package_query("Get-AppxPackage : error", "Contoso.Notes").is_err());
}

#[test]
fn provisioned_query_parses_both_shapes() {
    assert!(parse_provisioned_query(r#"{"found":false}"#)
        .expect("must parse")
        .is_none());

    let raw = r#"{"found":true,"displayName":"Contoso.Notes","packageName":"Contoso.Notes_1.4.0.0_neutral_~_8wekyb"}"#;
    let provisioned = parse_provisioned_query(raw)
        .expect("must parse")
        .expect("record should be present");
    assert_eq!(provisioned.display_name, "Contoso.Notes");
    assert_eq!(
        provisioned.package_identifier,
        "Contoso.Notes_1.4.0.0_neutral_~_8wekyb"
    );
}

#[test]
fn provisioned_query_rejects_missing_identifier() {
    let raw = r#"{"found":true,"displayName":"Contoso.Notes","packageName":""}"#;
    assert!(parse_provisioned_query(raw).is_err());
}

#[test]
fn winget_list_output_scanning_pins_literal_samples() {
    // Pinned winget list output: the table shape when found ...
    let found = "Name            Id            Version\n\
                 --------------------------------------\n\
                 Microsoft To Do 9NBLGGH5R558  2.100.61721.0\n";
    // ... and the sentinel when not.
    let missing = "No installed package found matching input criteria.\n";

    assert!(winget_reports_installed(found, "9NBLGGH5R558"));
    assert!(winget_reports_installed(found, "9nblggh5r558"));
    assert!(!winget_reports_installed(missing, "9NBLGGH5R558"));
    assert!(!winget_reports_installed("", "9NBLGGH5R558"));
}

#[test]
fn installer_dir_selection_sorts_descending() {
    let names = vec![
        "Microsoft.DesktopAppInstaller_1.21.3482.0_x64__8wekyb3d8bbwe".to_string(),
        "Microsoft.WindowsStore_22406.1401.2.0_x64__8wekyb3d8bbwe".to_string(),
        "Microsoft.DesktopAppInstaller_1.22.11261.0_x64__8wekyb3d8bbwe".to_string(),
    ];
    assert_eq!(
        select_latest_installer_dir(names).as_deref(),
        Some("Microsoft.DesktopAppInstaller_1.22.11261.0_x64__8wekyb3d8bbwe")
    );
    assert!(select_latest_installer_dir(vec!["unrelated".to_string()]).is_none());
}

#[test]
fn winget_version_parsing() {
    let version = parse_winget_version("v1.22.11261.0").expect("must parse");
    assert_eq!(version, semver::Version::new(1, 22, 11261));

    let version = parse_winget_version("1.6.2771").expect("must parse");
    assert_eq!(version, semver::Version::new(1, 6, 2771));

    let version = parse_winget_version("v1.7").expect("must parse");
    assert_eq!(version, semver::Version::new(1, 7, 0));

    assert!(parse_winget_version("preview").is_err());
    assert!(parse_winget_version("").is_err());
}

#[test]
fn winget_list_command_arguments() {
    let command = build_winget_list_command(Path::new("C:/winget.exe"), &app_target(false));
    assert_eq!(
        command_line(&command),
        vec![
            "C:/winget.exe",
            "list",
            "--id",
            "9NBLGGH5R558",
            "--source",
            "msstore",
            "--accept-source-agreements",
        ]
    );
}

#[test]
fn winget_install_command_arguments_by_id() {
    let command = build_winget_install_command(Path::new("C:/winget.exe"), &app_target(false));
    assert_eq!(
        command_line(&command),
        vec![
            "C:/winget.exe",
            "install",
            "--id",
            "9NBLGGH5R558",
            "--accept-package-agreements",
            "--accept-source-agreements",
            "--source",
            "msstore",
            "--scope",
            "machine",
        ]
    );
}

#[test]
fn winget_install_command_arguments_by_name() {
    let command = build_winget_install_command(Path::new("C:/winget.exe"), &app_target(true));
    assert_eq!(
        command_line(&command),
        vec![
            "C:/winget.exe",
            "install",
            "--name",
            "Microsoft To Do",
            "--accept-package-agreements",
            "--accept-source-agreements",
            "--source",
            "msstore",
            "--scope",
            "machine",
        ]
    );
}
