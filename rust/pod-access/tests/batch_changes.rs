use std::time::Duration;

use anyhow::Result;
use pod_access::{
    AccessControlResource, AccessEngine, AccessError, AccessModes, AclAuthorization, AclDocument,
    AcpPolicy,
    AgentRef, EngineConfig, FailureReason, JsonCodec, MemoryPod, PermissionDelta, PolicyDocument,
    PolicySystem, SessionContext, WebId,
};
use pretty_assertions::assert_eq;
use url::Url;

fn owner() -> WebId {
    WebId::new("https://owner.example/profile#me")
}

fn alice() -> WebId {
    WebId::new("webid:alice")
}

fn bob() -> AgentRef {
    WebId::new("webid:bob").into()
}

fn carol() -> AgentRef {
    WebId::new("webid:carol").into()
}

fn setup(system: PolicySystem, acting: WebId) -> Result<(MemoryPod, AccessEngine, SessionContext)> {
    let pod = MemoryPod::new(Url::parse("https://pod.example/")?, system, owner());
    let engine = AccessEngine::new(pod.connect(acting.clone()), JsonCodec, EngineConfig::default());
    Ok((pod, engine, SessionContext::new(acting)))
}

#[tokio::test]
async fn it_isolates_a_refusal_to_the_refused_resource() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Wac, alice())?;
    let a = pod.insert("a", "a", "text/plain")?;
    let b = pod.insert("b", "b", "text/plain")?;
    pod.set_policy(
        "a",
        AclDocument::new(vec![AclAuthorization::access_to(
            "#alice",
            vec![alice().into()],
            AccessModes::ALL,
        )]),
    )?;
    let b_policy = AclDocument::new(vec![AclAuthorization::access_to(
        "#alice",
        vec![alice().into()],
        AccessModes::READ,
    )]);
    pod.set_policy("b", b_policy.clone())?;

    let batch = engine
        .apply_change(
            &session,
            &pod.pod(),
            PolicySystem::Wac,
            vec![a.clone(), b.clone()],
            &PermissionDelta::grant(bob(), AccessModes::READ),
        )
        .await?;

    assert_eq!(batch.succeeded().iter().cloned().collect::<Vec<_>>(), vec![a.clone()]);
    assert_eq!(batch.failures().len(), 1);
    assert_eq!(batch.failures()[0].resource_url, b);
    assert_eq!(batch.failures()[0].acting_agent, alice());
    assert_eq!(batch.failures()[0].reason, FailureReason::NotAuthorized);

    assert_eq!(pod.policy("b")?, Some(PolicyDocument::Wac(b_policy)));
    let bob_on_a = engine
        .resolve(&session, &pod.pod(), PolicySystem::Wac, &a, &bob())
        .await?;
    assert_eq!(bob_on_a.modes, AccessModes::READ);
    assert_eq!(pod.writes(), 1);
    Ok(())
}

#[tokio::test]
async fn it_accounts_for_every_distinct_target() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Wac, owner())?;
    let first = pod.insert("data/first", "1", "text/plain")?;
    let second = pod.insert("data/second", "2", "text/plain")?;
    let missing = pod.url("data/missing")?;
    let broken = pod.insert("data/broken", "3", "text/plain")?;
    pod.set_raw_policy("data/broken", "not a policy")?;

    let targets = vec![
        first.clone(),
        second.clone(),
        first.clone(),
        missing.clone(),
        broken.clone(),
        second.clone(),
    ];
    let batch = engine
        .apply_change(
            &session,
            &pod.pod(),
            PolicySystem::Wac,
            targets,
            &PermissionDelta::grant(bob(), AccessModes::WRITE),
        )
        .await?;

    assert_eq!(batch.total(), 4);
    assert_eq!(
        batch.succeeded().iter().cloned().collect::<Vec<_>>(),
        vec![first, second]
    );
    assert_eq!(batch.failed_urls().cloned().collect::<Vec<_>>(), vec![missing.clone(), broken.clone()]);
    assert_eq!(
        batch.failure_for(&missing).map(|failure| failure.reason),
        Some(FailureReason::NotFound)
    );
    assert_eq!(
        batch.failure_for(&broken).map(|failure| failure.reason),
        Some(FailureReason::MalformedPolicy)
    );
    Ok(())
}

#[tokio::test]
async fn it_keeps_other_agents_grants() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Wac, owner())?;
    let file = pod.insert("data/shared", "x", "text/plain")?;
    pod.set_policy(
        "data/shared",
        AclDocument::new(vec![
            AclAuthorization::access_to("#owner", vec![owner().into()], AccessModes::ALL),
            AclAuthorization::access_to("#team", vec![bob(), carol()], AccessModes::READ),
        ]),
    )?;
    let pod_handle = pod.pod();

    engine
        .apply_change(
            &session,
            &pod_handle,
            PolicySystem::Wac,
            vec![file.clone()],
            &PermissionDelta::revoke(bob(), AccessModes::READ),
        )
        .await?;

    let carol_access = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &file, &carol())
        .await?;
    let bob_access = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &file, &bob())
        .await?;
    let owner_access = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &file, &owner().into())
        .await?;

    assert_eq!(carol_access.modes, AccessModes::READ);
    assert_eq!(bob_access.modes, AccessModes::NONE);
    assert_eq!(owner_access.modes, AccessModes::ALL);
    Ok(())
}

#[tokio::test]
async fn it_restores_access_after_granting_and_revoking() -> Result<()> {
    for system in [PolicySystem::Wac, PolicySystem::Acp] {
        let (pod, engine, session) = setup(system, owner())?;
        let file = pod.insert("data/report", "x", "text/plain")?;
        match system {
            PolicySystem::Wac => pod.set_policy(
                "data/",
                AclDocument::new(vec![
                    AclAuthorization::access_to("#owner", vec![owner().into()], AccessModes::ALL)
                        .inherited(),
                    AclAuthorization::access_to("#bob", vec![bob()], AccessModes::READ).inherited(),
                ]),
            )?,
            PolicySystem::Acp => pod.set_policy("data/report", AccessControlResource::default())?,
        }
        let pod_handle = pod.pod();
        let delta = PermissionDelta::grant(bob(), AccessModes::WRITE);

        let before = engine
            .resolve(&session, &pod_handle, system, &file, &bob())
            .await?;

        let granted = engine
            .apply_change(&session, &pod_handle, system, vec![file.clone()], &delta)
            .await?;
        assert!(granted.is_complete_success());
        let during = engine
            .resolve(&session, &pod_handle, system, &file, &bob())
            .await?;
        assert_eq!(during.modes, before.modes.union(AccessModes::WRITE));

        let revoked = engine
            .apply_change(&session, &pod_handle, system, vec![file.clone()], &delta.inverse())
            .await?;
        assert!(revoked.is_complete_success());
        let after = engine
            .resolve(&session, &pod_handle, system, &file, &bob())
            .await?;

        assert_eq!(after, before);
    }
    Ok(())
}

#[tokio::test]
async fn it_revokes_inherited_wac_access() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Wac, owner())?;
    let file = pod.insert("data/diary", "x", "text/plain")?;
    pod.set_policy(
        "data/",
        AclDocument::new(vec![
            AclAuthorization::access_to("#owner", vec![owner().into()], AccessModes::ALL).inherited(),
            AclAuthorization::access_to("#friends", vec![bob(), carol()], AccessModes::READ)
                .inherited(),
        ]),
    )?;
    let pod_handle = pod.pod();

    let batch = engine
        .apply_change(
            &session,
            &pod_handle,
            PolicySystem::Wac,
            vec![file.clone()],
            &PermissionDelta::revoke(bob(), AccessModes::READ),
        )
        .await?;
    assert!(batch.is_complete_success());

    let bob_access = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &file, &bob())
        .await?;
    let carol_access = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &file, &carol())
        .await?;
    let owner_access = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &file, &owner().into())
        .await?;

    assert_eq!(bob_access.modes, AccessModes::NONE);
    assert_eq!(carol_access.modes, AccessModes::READ);
    assert_eq!(owner_access.modes, AccessModes::ALL);
    Ok(())
}

#[tokio::test]
async fn it_seeds_container_acls_with_inherited_rules() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Wac, owner())?;
    let container = pod.insert_container("data/photos")?;
    let photo = pod.insert("data/photos/cat.png", "png", "image/png")?;
    let pod_handle = pod.pod();

    engine
        .apply_change(
            &session,
            &pod_handle,
            PolicySystem::Wac,
            vec![container.clone()],
            &PermissionDelta::grant(bob(), AccessModes::READ),
        )
        .await?;

    let Some(PolicyDocument::Wac(acl)) = pod.policy("data/photos/")? else {
        panic!("expected a new ACL for the container");
    };
    assert_eq!(acl.inherited_access(&owner().into()), Some(AccessModes::ALL));

    let owner_on_photo = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &photo, &owner().into())
        .await?;
    let bob_on_container = engine
        .resolve(&session, &pod_handle, PolicySystem::Wac, &container, &bob())
        .await?;

    assert_eq!(owner_on_photo.modes, AccessModes::ALL);
    assert_eq!(bob_on_container.modes, AccessModes::READ);
    Ok(())
}

#[tokio::test]
async fn it_refuses_acp_changes_without_control() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Acp, alice())?;
    let record = pod.insert("data/record", "{}", "application/json")?;
    pod.set_policy("data/record", AccessControlResource::default())?;

    let batch = engine
        .apply_change(
            &session,
            &pod.pod(),
            PolicySystem::Acp,
            vec![record.clone()],
            &PermissionDelta::grant(bob(), AccessModes::READ),
        )
        .await?;

    assert!(batch.succeeded().is_empty());
    assert_eq!(
        batch.failure_for(&record).map(|failure| failure.reason),
        Some(FailureReason::NotAuthorized)
    );
    assert_eq!(pod.writes(), 0);
    Ok(())
}

#[tokio::test]
async fn it_accepts_control_held_only_on_the_target() -> Result<()> {
    let dave = WebId::new("webid:dave");

    for system in [PolicySystem::Wac, PolicySystem::Acp] {
        let (pod, engine, session) = setup(system, dave.clone())?;
        let shared = pod.insert("data/shared", "x", "text/plain")?;
        let grant = vec![AgentRef::from(dave.clone())];
        match system {
            PolicySystem::Wac => pod.set_policy(
                "data/shared",
                AclDocument::new(vec![AclAuthorization::access_to("#dave", grant, AccessModes::ALL)]),
            )?,
            PolicySystem::Acp => pod.set_policy(
                "data/shared",
                AccessControlResource {
                    access_control: vec![AcpPolicy::new("#dave", grant, AccessModes::ALL)],
                    ..Default::default()
                },
            )?,
        }
        pod.deny(&dave, "data/")?;
        pod.deny(&dave, "")?;

        let batch = engine
            .apply_change(
                &session,
                &pod.pod(),
                system,
                vec![shared.clone()],
                &PermissionDelta::grant(carol(), AccessModes::READ),
            )
            .await?;

        assert!(batch.is_complete_success(), "{system}: {:?}", batch.failures());
        let carol_access = engine
            .resolve(&session, &pod.pod(), system, &shared, &carol())
            .await?;
        assert_eq!(carol_access.modes, AccessModes::READ);
    }
    Ok(())
}

#[tokio::test]
async fn it_reports_pod_side_refusals_per_resource() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Wac, owner())?;
    let open = pod.insert("data/open", "x", "text/plain")?;
    let locked = pod.insert("data/locked", "x", "text/plain")?;
    pod.fail_next(&pod.policy_url("data/locked")?, [404, 403]);

    let batch = engine
        .apply_change(
            &session,
            &pod.pod(),
            PolicySystem::Wac,
            vec![open.clone(), locked.clone()],
            &PermissionDelta::grant(bob(), AccessModes::READ),
        )
        .await?;

    assert!(batch.succeeded().contains(&open));
    assert_eq!(
        batch.failure_for(&locked).map(|failure| failure.reason),
        Some(FailureReason::NotAuthorized)
    );
    Ok(())
}

#[tokio::test]
async fn it_returns_cancelled_when_the_session_ends_mid_batch() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Wac, owner())?;
    let mut targets = Vec::new();
    for index in 0..10 {
        targets.push(pod.insert(&format!("data/item-{index}"), "x", "text/plain")?);
    }
    pod.limit_writes(5);

    let task = {
        let engine = engine.clone();
        let session = session.clone();
        let pod_handle = pod.pod();
        let targets = targets.clone();
        tokio::spawn(async move {
            engine
                .apply_change(
                    &session,
                    &pod_handle,
                    PolicySystem::Wac,
                    targets,
                    &PermissionDelta::grant(bob(), AccessModes::READ),
                )
                .await
        })
    };

    for _ in 0..1000 {
        if pod.writes() >= 5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(pod.writes(), 5);
    session.invalidate();

    let result = task.await?;
    assert_eq!(result, Err(AccessError::Cancelled));

    let mut changed = 0;
    for index in 0..10 {
        match pod.policy(&format!("data/item-{index}"))? {
            Some(PolicyDocument::Wac(acl)) => {
                assert_eq!(acl.direct_access(&bob()), Some(AccessModes::READ));
                changed += 1;
            }
            Some(other) => panic!("unexpected document {other:?}"),
            None => {}
        }
    }
    assert_eq!(changed, 5);
    assert_eq!(pod.writes(), 5);
    Ok(())
}

#[tokio::test]
async fn it_returns_an_empty_batch_for_no_targets() -> Result<()> {
    let (pod, engine, session) = setup(PolicySystem::Wac, owner())?;

    let batch = engine
        .apply_change(
            &session,
            &pod.pod(),
            PolicySystem::Wac,
            vec![],
            &PermissionDelta::grant(bob(), AccessModes::READ),
        )
        .await?;

    assert_eq!(batch.total(), 0);
    assert_eq!(pod.requests(), 0);
    Ok(())
}
