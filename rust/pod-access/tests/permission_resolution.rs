use anyhow::Result;
use pod_access::{
    AccessControlResource, AccessEngine, AccessError, AccessModes, AclAuthorization, AclDocument,
    AcpPolicy, AgentRef, EngineConfig, JsonCodec, MemoryPod, PolicySystem, SessionContext, WebId,
};
use pretty_assertions::assert_eq;
use url::Url;

fn owner() -> WebId {
    WebId::new("https://owner.example/profile#me")
}

fn alice() -> AgentRef {
    WebId::new("webid:alice").into()
}

fn bob() -> AgentRef {
    WebId::new("webid:bob").into()
}

fn setup(system: PolicySystem) -> Result<(MemoryPod, AccessEngine, SessionContext)> {
    let pod = MemoryPod::new(Url::parse("https://pod.example/")?, system, owner());
    let engine = AccessEngine::new(pod.connect(owner()), JsonCodec, EngineConfig::default());
    Ok((pod, engine, SessionContext::new(owner())))
}

#[tokio::test]
async fn it_inherits_wac_access_from_the_parent_container() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Wac)?;
    let report = pod.insert("data/health/report1", "{}", "application/json")?;
    pod.set_policy(
        "data/health/",
        AclDocument::new(vec![
            AclAuthorization::access_to("#alice", vec![alice()], AccessModes::READ).inherited(),
        ]),
    )?;

    let permissions = engine
        .resolve(&session, &pod.pod(), PolicySystem::Wac, &report, &alice())
        .await?;

    assert_eq!(permissions.agent, alice());
    assert_eq!(
        permissions.modes,
        AccessModes {
            read: true,
            write: false,
            append: false,
            control: false,
        }
    );
    Ok(())
}

#[tokio::test]
async fn it_applies_only_the_nearest_wac_definition() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Wac)?;
    let note = pod.insert("data/notes/today", "hi", "text/plain")?;
    pod.set_policy(
        "",
        AclDocument::new(vec![
            AclAuthorization::access_to("#owner", vec![owner().into()], AccessModes::ALL).inherited(),
            AclAuthorization::access_to("#bob", vec![bob()], AccessModes::WRITE).inherited(),
        ]),
    )?;
    pod.set_policy(
        "data/",
        AclDocument::new(vec![
            AclAuthorization::access_to("#bob", vec![bob()], AccessModes::READ).inherited(),
        ]),
    )?;
    let pod_handle = pod.pod();

    let bob_access = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &note, &bob())
        .await?;
    let owner_access = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &note, &owner().into())
        .await?;
    let alice_access = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &note, &alice())
        .await?;

    assert_eq!(bob_access.modes, AccessModes::READ);
    assert_eq!(owner_access.modes, AccessModes::ALL);
    assert_eq!(alice_access.modes, AccessModes::NONE);
    Ok(())
}

#[tokio::test]
async fn it_prefers_the_resources_own_wac_rules() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Wac)?;
    let file = pod.insert("data/file", "x", "text/plain")?;
    pod.set_policy(
        "data/file",
        AclDocument::new(vec![
            AclAuthorization::access_to("#public", vec![AgentRef::Public], AccessModes::READ),
            AclAuthorization::access_to("#bob", vec![bob()], AccessModes::APPEND),
        ]),
    )?;
    let pod_handle = pod.pod();

    let bob_access = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &file, &bob())
        .await?;
    let anyone = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &file, &alice())
        .await?;

    assert_eq!(bob_access.modes, AccessModes::READ.union(AccessModes::APPEND));
    assert_eq!(anyone.modes, AccessModes::READ);
    Ok(())
}

#[tokio::test]
async fn it_unions_acp_policies_along_the_container_chain() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Acp)?;
    let record = pod.insert("data/records/r1", "{}", "application/json")?;
    pod.set_policy(
        "data/",
        AccessControlResource {
            access_control: vec![],
            member_access_control: vec![AcpPolicy::new("#readers", vec![bob()], AccessModes::READ)],
        },
    )?;
    pod.set_policy(
        "data/records/r1",
        AccessControlResource {
            access_control: vec![
                AcpPolicy::new("#appenders", vec![bob()], AccessModes::APPEND),
                AcpPolicy::new("#public", vec![AgentRef::Public], AccessModes::WRITE),
            ],
            member_access_control: vec![],
        },
    )?;
    let pod_handle = pod.pod();

    let bob_access = engine
        .resolve(&session, &pod_handle, PolicySystem::Acp, &record, &bob())
        .await?;
    let alice_access = engine
        .resolve(&session, &pod_handle, PolicySystem::Acp, &record, &alice())
        .await?;
    let owner_access = engine
        .resolve(&session, &pod_handle, PolicySystem::Acp, &record, &owner().into())
        .await?;

    assert_eq!(
        bob_access.modes,
        AccessModes::READ
            .union(AccessModes::APPEND)
            .union(AccessModes::WRITE)
    );
    assert_eq!(alice_access.modes, AccessModes::WRITE);
    assert_eq!(owner_access.modes, AccessModes::ALL);
    Ok(())
}

#[tokio::test]
async fn it_requires_an_own_acr_under_acp() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Acp)?;
    let record = pod.insert("data/r1", "{}", "application/json")?;

    let result = engine
        .resolve(&session, &pod.pod(), PolicySystem::Acp, &record, &bob())
        .await;

    assert!(matches!(result, Err(AccessError::NotFound { .. })));
    Ok(())
}

#[tokio::test]
async fn it_reports_missing_resources() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Wac)?;
    let missing = pod.url("data/missing")?;

    let result = engine
        .resolve(&session, &pod.pod(), PolicySystem::Wac, &missing, &bob())
        .await;

    assert_eq!(result, Err(AccessError::NotFound { url: missing }));
    Ok(())
}

#[tokio::test]
async fn it_reports_malformed_policy_documents() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Wac)?;
    let garbled = pod.insert("data/garbled", "x", "text/plain")?;
    let foreign = pod.insert("data/foreign", "x", "text/plain")?;
    pod.set_raw_policy("data/garbled", "@prefix acl: <http://www.w3.org/ns/auth/acl#> .")?;
    pod.set_policy("data/foreign", AccessControlResource::default())?;
    let pod_handle = pod.pod();

    let garbled = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &garbled, &bob())
        .await;
    let foreign = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &foreign, &bob())
        .await;

    assert!(matches!(garbled, Err(AccessError::MalformedPolicy { .. })));
    assert!(matches!(foreign, Err(AccessError::MalformedPolicy { .. })));
    Ok(())
}

#[tokio::test]
async fn it_resolves_identically_without_intervening_writes() -> Result<()> {
    for system in [PolicySystem::Wac, PolicySystem::Acp] {
        let (pod, engine, session) = setup(system)?;
        let file = pod.insert("data/file", "x", "text/plain")?;
        if system == PolicySystem::Acp {
            pod.set_policy("data/file", AccessControlResource::default())?;
        }
        let pod_handle = pod.pod();

        let first = engine
            .resolve(&session, &pod_handle, system, &file, &owner().into())
            .await?;
        let second = engine
            .resolve(&session, &pod_handle, system, &file, &owner().into())
            .await?;

        assert_eq!(first, second);
        assert_eq!(pod.writes(), 0);
    }
    Ok(())
}

#[tokio::test]
async fn it_does_not_resolve_on_an_ended_session() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Wac)?;
    let file = pod.insert("data/file", "x", "text/plain")?;
    session.invalidate();

    let result = engine
        .resolve(&session, &pod.pod(), PolicySystem::Wac, &file, &bob())
        .await;

    assert_eq!(result, Err(AccessError::Cancelled));
    assert_eq!(pod.requests(), 0);
    Ok(())
}
