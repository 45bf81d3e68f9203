mod support;

use serde_json::json;
use support::*;
use wbak_app_core::{CommandId, CommandResponse, Severity, TaskCategory};
use wbak_core::{derive_password, GateState, PipelineState, ResourceType};

fn rooted_harness() -> Harness {
    let mut h = harness(1_000);
    h.core.channel_connected();
    respond(&mut h.core, CommandId::CheckDevice, json!("emulator-5554"));
    respond(&mut h.core, CommandId::CheckRoot, json!(true));
    assert_eq!(h.core.gate().state(), GateState::RootReady);
    h.channel.take();
    h
}

#[test]
fn connecting_starts_the_device_heartbeat_and_recovery() {
    let mut h = harness(1_000);
    assert!(h.core.channel_connected());

    let tasks = h.channel.tasks();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].name, "Device checker");
    assert_eq!(tasks[0].category, TaskCategory::Heartbeat);
    assert_eq!(
        tasks[0].params,
        json!({"command": "check_device", "interval": 3})
    );
    assert_eq!(tasks[1].name, "Exist projects");
    assert_eq!(tasks[1].category, TaskCategory::Once);
    assert_eq!(tasks[1].params, json!({"command": "get_exist_projects"}));

    assert_eq!(
        h.sink.messages(Severity::Success),
        vec!["Server is connected".to_string()]
    );
    assert_eq!(*h.sink.gates.lock().unwrap(), vec![GateState::ChannelReady]);

    // already connected
    assert!(!h.core.channel_connected());
}

#[test]
fn device_heartbeat_climbs_and_falls() {
    let mut h = harness(1_000);
    h.core.channel_connected();
    h.channel.take();

    respond(&mut h.core, CommandId::CheckDevice, json!("emulator-5554"));
    assert_eq!(h.core.gate().state(), GateState::DeviceReady);
    let properties = h.channel.commands();
    assert_eq!(properties.len(), 1);
    assert_eq!(properties[0].command, CommandId::GetDeviceProperties);
    assert_eq!(h.channel.tasks()[0].name, "Root checker");

    // same serial again: nothing new is asked
    h.channel.take();
    respond(&mut h.core, CommandId::CheckDevice, json!("emulator-5554"));
    assert!(h.channel.take().is_empty());

    respond(&mut h.core, CommandId::CheckDevice, json!(""));
    assert_eq!(h.core.gate().state(), GateState::ChannelReady);
    assert_eq!(h.channel.kills(), vec!["Root checker".to_string()]);
    assert_eq!(h.core.device().serial, "");
    assert!(h
        .sink
        .messages(Severity::Error)
        .contains(&"Device has been disconnected".to_string()));
}

#[test]
fn device_properties_label_the_gate() {
    let mut h = harness(1_000);
    h.core.channel_connected();
    respond(&mut h.core, CommandId::CheckDevice, json!("emulator-5554"));
    respond(
        &mut h.core,
        CommandId::GetDeviceProperties,
        json!({
            "ro.product.manufacturer": "Xiaomi",
            "ro.product.model": "MI 6",
            "net.hostname": "mi6",
        }),
    );

    let info = h.core.device().info.clone().unwrap();
    assert_eq!(info.manufacturer, "Xiaomi");
    assert_eq!(info.serial, "emulator-5554");
    assert_eq!(h.core.gate_view().device_label, "MI 6 is connected");
}

#[test]
fn unrooted_device_gets_one_insecure_adbd_reminder() {
    let mut h = harness(1_000);
    h.core.channel_connected();
    respond(&mut h.core, CommandId::CheckDevice, json!("emulator-5554"));
    h.channel.take();

    respond(&mut h.core, CommandId::CheckRoot, json!(false));
    assert_eq!(h.core.gate().state(), GateState::DeviceReady);
    let probe = h.channel.commands();
    assert_eq!(probe[0].command, CommandId::CheckInsecure);

    respond(&mut h.core, CommandId::CheckInsecure, json!(false));
    respond(&mut h.core, CommandId::CheckRoot, json!(false));
    respond(&mut h.core, CommandId::CheckInsecure, json!(false));

    let reminders: Vec<String> = h
        .sink
        .messages(Severity::Info)
        .into_iter()
        .filter(|m| m.contains("adbd Insecure"))
        .collect();
    assert_eq!(reminders.len(), 1);
    assert_eq!(h.core.device().insecure_installed, Some(false));
}

#[test]
fn losing_the_channel_demotes_everything_in_one_call() {
    let mut h = ready_harness(1_000);
    with_project(&mut h, PipelineState::Waiting);
    assert!(h
        .sink
        .last_update(PROJECT)
        .unwrap()
        .item(ResourceType::EncryptedDb)
        .can_start);

    h.channel.set_connected(false);
    assert!(h.core.channel_disconnected());

    assert_eq!(h.core.gate().state(), GateState::Disconnected);
    assert_eq!(h.core.gate().active_pollers().count(), 0);
    assert_eq!(
        h.sink.messages(Severity::Error),
        vec![
            "Device has been disconnected".to_string(),
            "Server has been disconnected".to_string(),
        ]
    );
    assert!(!h
        .core
        .pipeline(PROJECT)
        .unwrap()
        .start_enabled(ResourceType::EncryptedDb));
    assert!(!h
        .sink
        .last_update(PROJECT)
        .unwrap()
        .item(ResourceType::EncryptedDb)
        .can_start);
}

#[test]
fn nothing_is_sent_on_a_closed_channel() {
    let mut h = ready_harness(1_000);
    with_project(&mut h, PipelineState::Waiting);
    h.channel.set_connected(false);

    assert!(!h.core.start(PROJECT, ResourceType::EncryptedDb));
    assert!(h.channel.take().is_empty());
    assert_eq!(h.core.pipeline(PROJECT).unwrap().state(), PipelineState::Waiting);
    assert!(h
        .sink
        .messages(Severity::Error)
        .iter()
        .any(|m| m.contains("disconnected")));
}

#[test]
fn credentials_are_locked_until_root() {
    let mut h = harness(1_000);
    h.core.channel_connected();
    assert!(!h.core.set_credentials(IMEI, UIN, USER));
    assert!(!h.core.gate_view().can_edit_credentials);
    assert!(h
        .sink
        .messages(Severity::Info)
        .iter()
        .all(|m| !m.starts_with("Calculated password")));
}

#[test]
fn single_candidates_are_picked_automatically() {
    let mut h = rooted_harness();
    assert!(h.core.request_credentials());
    let asked: Vec<CommandId> = h.channel.commands().iter().map(|c| c.command).collect();
    assert_eq!(
        asked,
        vec![CommandId::GetUsers, CommandId::GetImei, CommandId::GetUin]
    );

    respond(&mut h.core, CommandId::GetUsers, json!([USER]));
    assert_eq!(h.core.gate().credentials().user, USER);

    respond(&mut h.core, CommandId::GetImei, json!([IMEI, "990000862471854"]));
    assert_eq!(h.core.candidates().imeis.len(), 2);
    assert_eq!(h.core.gate().credentials().imei, "");
    assert!(h.core.select_imei(IMEI));

    respond(&mut h.core, CommandId::GetUin, json!(UIN));
    assert_eq!(h.core.gate().state(), GateState::CredentialsReady);
    assert!(h.core.gate_view().can_create_project);
    assert!(h
        .sink
        .messages(Severity::Info)
        .contains(&format!("Calculated password: {}", derive_password(IMEI, UIN))));

    // clearing the uin drops the level again
    assert!(h.core.set_uin(""));
    assert_eq!(h.core.gate().state(), GateState::RootReady);
}

#[test]
fn response_messages_are_surfaced_between_handlers() {
    let mut h = harness(1_000);
    h.core.handle_response(CommandResponse {
        command: "reboot".into(),
        name: String::new(),
        success: false,
        data: json!(null),
        message: "unsupported".into(),
    });
    assert_eq!(
        h.sink.messages(Severity::Error),
        vec!["unsupported".to_string()]
    );

    h.core
        .handle_response(CommandResponse::ok(CommandId::GetUin, json!("")).with_message("uin read"));
    assert_eq!(h.sink.messages(Severity::Info), vec!["uin read".to_string()]);
}

#[test]
fn recovered_listing_builds_pipelines() {
    let mut h = harness(1_000);
    h.core.channel_connected();
    let mut projects = serde_json::Map::new();
    projects.insert(
        PROJECT.to_string(),
        json!({
            "user": USER,
            "password": "5cdc092",
            "files": [[format!("data/{PROJECT}/EnMicroMsg.db"), 100]],
        }),
    );
    projects.insert(
        "not-a-project".to_string(),
        json!({"user": USER, "password": "x", "files": []}),
    );
    let listing = serde_json::Value::Object(projects).to_string();

    respond(&mut h.core, CommandId::GetExistProjects, json!(listing));
    assert_eq!(h.core.registry().names(), vec![PROJECT.to_string()]);
    assert_eq!(
        h.core.pipeline(PROJECT).unwrap().state(),
        PipelineState::DbPulled
    );
    // gate is below root: nothing may start yet
    assert!(!h.sink.last_update(PROJECT).unwrap().item(ResourceType::DecryptedDb).can_start);
}

#[test]
fn losing_the_device_with_credentials_disables_every_stage_at_once() {
    let mut h = ready_harness(1_000);
    with_project(&mut h, PipelineState::Waiting);
    assert!(h.core.pipeline(PROJECT).unwrap().start_enabled(ResourceType::EncryptedDb));
    h.sink.gates.lock().unwrap().clear();

    respond(&mut h.core, CommandId::CheckDevice, json!(""));

    assert_eq!(h.core.gate().state(), GateState::ChannelReady);
    // credentials, root and device go in a single transition
    assert_eq!(*h.sink.gates.lock().unwrap(), vec![GateState::ChannelReady]);
    assert_eq!(h.channel.kills(), vec!["Root checker".to_string()]);
    let pipeline = h.core.pipeline(PROJECT).unwrap();
    for resource in ResourceType::ALL {
        assert!(!pipeline.start_enabled(resource));
    }
    let vm = h.sink.last_update(PROJECT).unwrap();
    assert!(!vm.item(ResourceType::EncryptedDb).can_start);
    assert_eq!(pipeline.state(), PipelineState::Waiting);
}

#[test]
fn each_sent_command_awaits_exactly_one_response() {
    let mut h = rooted_harness();
    assert!(!h.core.is_awaiting(CommandId::GetUsers));
    h.core.request_credentials();
    assert!(h.core.is_awaiting(CommandId::GetUsers));
    assert!(h.core.is_awaiting(CommandId::GetUin));

    respond(&mut h.core, CommandId::GetUsers, json!([USER]));
    assert!(!h.core.is_awaiting(CommandId::GetUsers));
    assert!(h.core.is_awaiting(CommandId::GetUin));

    // a repeated response still reaches its handlers
    respond(&mut h.core, CommandId::GetUsers, json!(["fedcba9876543210fedcba9876543210"]));
    assert!(!h.core.is_awaiting(CommandId::GetUsers));
    assert_eq!(h.core.candidates().users.len(), 1);
}
