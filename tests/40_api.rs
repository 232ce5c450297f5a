mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use casework_api::database::models::Project;
use casework_api::permissions::{Permission, Role};
use casework_api::secrets::SENTINEL;
use casework_api::AppState;

struct TestApp {
    state: AppState,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let state = common::app_state();
        let router = casework_api::app(state.clone());
        Self { state, router }
    }

    async fn raw(&self, request: Request<Body>) -> Result<(StatusCode, Vec<u8>)> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, bytes.to_vec()))
    }

    async fn json(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let (status, bytes) = self.raw(request).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }

    async fn login(&self, email: &str, extra: Value) -> Result<(StatusCode, Value)> {
        let mut body = json!({ "email": email, "password": common::PASSWORD });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            body.extend(extra.clone());
        }
        self.json(Method::POST, "/auth/login", None, Some(body)).await
    }

    /// A stored project whose owner is a fresh admin
    async fn project(&self) -> Result<Uuid> {
        let owner = common::create_user(&self.state, &format!("owner-{}@example.com", Uuid::new_v4()), Role::Admin).await;
        let project = Project::new("Shelter intake", owner.id);
        let row = Permission::for_role(owner.id, project.id, Role::Admin);
        self.state.stores.projects.insert(&project, &row).await?;
        Ok(project.id)
    }

    async fn member(&self, email: &str, role: Role, project: Uuid) -> Result<String> {
        let user = common::create_user(&self.state, email, role).await;
        self.state
            .stores
            .permissions
            .insert(&Permission::for_role(user.id, project, role))
            .await?;
        Ok(common::access_token(&self.state, &user))
    }
}

#[tokio::test]
async fn health_reports_ok() -> Result<()> {
    let app = TestApp::new();
    let (status, body) = app.json(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["keys"], 1);
    Ok(())
}

#[tokio::test]
async fn login_and_whoami() -> Result<()> {
    let app = TestApp::new();
    common::create_user(&app.state, "staff@example.com", Role::Staff).await;

    let (status, body) = app.login("staff@example.com", json!({})).await?;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["access_token"].as_str().unwrap().to_string();
    assert!(body["data"]["user"].get("password_hash").is_none());

    let (status, body) = app.json(Method::GET, "/api/auth/whoami", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "staff@example.com");
    assert_eq!(body["data"]["role"], "staff");

    // Refresh token cannot be used as an access token, but can be exchanged
    let refresh = app.login("staff@example.com", json!({})).await?.1["data"]["refresh_token"]
        .as_str()
        .unwrap()
        .to_string();
    let (status, _) = app.json(Method::GET, "/api/auth/whoami", Some(&refresh), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .json(Method::POST, "/auth/refresh", None, Some(json!({ "refresh_token": refresh })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["access_token"].is_string());
    Ok(())
}

#[tokio::test]
async fn bad_credentials_are_generic() -> Result<()> {
    let app = TestApp::new();
    common::create_user(&app.state, "staff@example.com", Role::Staff).await;

    let (status, wrong_password) = app
        .json(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "staff@example.com", "password": "nope" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, unknown_user) = app.login("nobody@example.com", json!({})).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password["error"], unknown_user["error"]);
    assert_eq!(wrong_password["success"], false);
    Ok(())
}

#[tokio::test]
async fn protected_routes_need_a_token() -> Result<()> {
    let app = TestApp::new();
    let (status, body) = app.json(Method::GET, "/api/auth/whoami", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = app
        .json(Method::GET, "/api/auth/whoami", Some("not.a.token"), None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn mfa_enrolment_and_login() -> Result<()> {
    let app = TestApp::new();
    let user = common::create_user(&app.state, "mfa@example.com", Role::Staff).await;
    let token = common::access_token(&app.state, &user);

    let (status, setup) = app.json(Method::POST, "/api/auth/mfa/setup", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(setup["data"]["provisioning_uri"].as_str().unwrap().starts_with("otpauth://"));
    let backup_codes: Vec<String> = serde_json::from_value(setup["data"]["backup_codes"].clone())?;

    // Not enabled until confirmed
    assert_eq!(app.login("mfa@example.com", json!({})).await?.0, StatusCode::OK);

    let stored = app.state.stores.users.find_by_id(user.id).await?.unwrap();
    let secret = stored.totp_secret.clone().unwrap();
    let code = app.state.auth.mfa().current_code(&secret)?;
    let (status, body) = app
        .json(Method::POST, "/api/auth/mfa/confirm", Some(&token), Some(json!({ "code": code })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["mfa_enabled"], true);

    let (status, body) = app.login("mfa@example.com", json!({})).await?;
    assert_eq!(status, StatusCode::EXPECTATION_FAILED);
    assert_eq!(body["code"], "TOTP_REQUIRED");

    let code = app.state.auth.mfa().current_code(&secret)?;
    let wrong = if code == "000000" { "111111" } else { "000000" };
    let (status, body) = app.login("mfa@example.com", json!({ "totp": wrong })).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid authentication code");

    let (status, _) = app.login("mfa@example.com", json!({ "totp": code })).await?;
    assert_eq!(status, StatusCode::OK);

    // Backup codes work once
    let backup = json!({ "backup_code": backup_codes[0] });
    assert_eq!(app.login("mfa@example.com", backup.clone()).await?.0, StatusCode::OK);
    assert_eq!(app.login("mfa@example.com", backup).await?.0, StatusCode::UNAUTHORIZED);
    assert_eq!(
        app.login("mfa@example.com", json!({ "backup_code": backup_codes[1] })).await?.0,
        StatusCode::OK
    );
    Ok(())
}

#[tokio::test]
async fn members_follow_invite_rights() -> Result<()> {
    let app = TestApp::new();
    let project = app.project().await?;
    let staff = app.member("staff@example.com", Role::Staff, project).await?;
    let guest = common::create_user(&app.state, "guest@example.com", Role::Guest).await;
    let uri = format!("/api/projects/{}/members", project);

    let (status, body) = app
        .json(Method::POST, &uri, Some(&staff), Some(json!({ "user_id": guest.id })))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["can_read"], true);
    assert_eq!(body["data"]["can_create"], false);

    let (status, body) = app
        .json(Method::POST, &uri, Some(&staff), Some(json!({ "user_id": guest.id })))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let guest_token = common::access_token(&app.state, &guest);
    let member_uri = format!("{}/{}", uri, guest.id);
    let (status, _) = app
        .json(Method::PATCH, &member_uri, Some(&guest_token), Some(json!({ "can_create": true })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .json(Method::PATCH, &member_uri, Some(&staff), Some(json!({ "can_create": true })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["can_create"], true);
    assert_eq!(body["data"]["can_read"], true);

    let (status, body) = app.json(Method::GET, &member_uri, Some(&guest_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user_id"], guest.id.to_string());

    // Staff has no delete right by default
    let (status, _) = app.json(Method::DELETE, &member_uri, Some(&staff), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn persons_redact_and_preserve_personal_info() -> Result<()> {
    let app = TestApp::new();
    let project = app.project().await?;
    let consultant = app.member("consultant@example.com", Role::Consultant, project).await?;
    let staff = app.member("staff@example.com", Role::Staff, project).await?;
    let uri = format!("/api/projects/{}/persons", project);

    let (status, body) = app
        .json(
            Method::POST,
            &uri,
            Some(&consultant),
            Some(json!({ "full_name": "Amina", "email": "amina@example.org", "phone": "+111111111" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["phone"], "+111111111");
    let person_id: Uuid = serde_json::from_value(body["data"]["id"].clone())?;
    let person_uri = format!("{}/{}", uri, person_id);

    let stored = app.state.stores.persons.find(project, person_id).await?.unwrap();
    assert_ne!(stored.personal.phone.as_deref(), Some("+111111111"));

    // Staff can read the record but not the personal fields
    let (status, body) = app.json(Method::GET, &person_uri, Some(&staff), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["full_name"], "Amina");
    assert_eq!(body["data"]["phone"], SENTINEL);
    assert!(body["data"]["phone_additional"].is_null());

    // ...and may not update it
    let (status, _) = app
        .json(Method::PATCH, &person_uri, Some(&staff), Some(json!({ "full_name": "A." })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Sentinel leaves email untouched, phone changes
    let (status, body) = app
        .json(
            Method::PATCH,
            &person_uri,
            Some(&consultant),
            Some(json!({ "email": SENTINEL, "phone": "+222222222" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "amina@example.org");
    assert_eq!(body["data"]["phone"], "+222222222");

    let updated = app.state.stores.persons.find(project, person_id).await?.unwrap();
    assert_eq!(updated.personal.email, stored.personal.email);
    assert_ne!(updated.personal.phone, stored.personal.phone);

    // null clears
    let (_, body) = app
        .json(Method::PATCH, &person_uri, Some(&consultant), Some(json!({ "phone": null })))
        .await?;
    assert!(body["data"]["phone"].is_null());
    Ok(())
}

#[tokio::test]
async fn documents_upload_download_delete() -> Result<()> {
    let app = TestApp::new();
    let project = app.project().await?;
    let consultant = app.member("consultant@example.com", Role::Consultant, project).await?;
    let staff = app.member("staff@example.com", Role::Staff, project).await?;

    let upload = |token: &str, content_type: &str, body: &'static [u8]| {
        Request::builder()
            .method(Method::POST)
            .uri(format!("/api/projects/{}/documents?filename=notes.txt", project))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
    };

    let (status, bytes) = app.raw(upload(&consultant, "text/plain", b"0123456789")?).await?;
    assert_eq!(status, StatusCode::CREATED);
    let body: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["data"]["size"], 10);
    assert!(body["data"].get("encryption_key").is_none());
    let document_uri = format!("/api/projects/{}/documents/{}", project, body["data"]["id"].as_str().unwrap());

    let (status, bytes) = app.raw(upload(&consultant, "application/x-msdownload", b"MZ")?).await?;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["code"], "UNSUPPORTED_MEDIA_TYPE");

    let download = |token: &str| {
        Request::builder()
            .uri(document_uri.as_str())
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
    };

    let (status, bytes) = app.raw(download(&consultant)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"0123456789");

    // Staff lacks can_read_documents by default
    let (status, _) = app.raw(download(&staff)?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.json(Method::DELETE, &document_uri, Some(&consultant), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.raw(download(&consultant)?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn oversized_upload_is_rejected() -> Result<()> {
    let app = TestApp::new();
    let project = app.project().await?;
    let consultant = app.member("consultant@example.com", Role::Consultant, project).await?;
    let too_big = vec![b'a'; app.state.config.uploads.max_upload_bytes + 1];

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/projects/{}/documents?filename=big.txt", project))
        .header(header::AUTHORIZATION, format!("Bearer {}", consultant))
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(too_big))?;

    let (status, _) = app.raw(request).await?;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    Ok(())
}

#[tokio::test]
async fn members_cannot_escalate_their_own_rights() -> Result<()> {
    let app = TestApp::new();
    let project = app.project().await?;
    let staff = app.member("staff@example.com", Role::Staff, project).await?;
    let staff_id = app.state.stores.users.find_by_email("staff@example.com").await?.unwrap().id;
    let guest = common::create_user(&app.state, "guest@example.com", Role::Guest).await;
    let uri = format!("/api/projects/{}/members", project);

    let (status, _) = app
        .json(
            Method::PATCH,
            &format!("{}/{}", uri, staff_id),
            Some(&staff),
            Some(json!({ "can_delete": true, "can_read_documents": true, "can_read_personal_info": true })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let everything = json!({
        "user_id": guest.id,
        "capabilities": {
            "can_create": true, "can_read": true, "can_update": true, "can_delete": true,
            "can_create_projects": true, "can_read_documents": true,
            "can_read_personal_info": true, "can_invite_members": true
        }
    });
    let (status, _) = app.json(Method::POST, &uri, Some(&staff), Some(everything)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Nothing was written by either request
    let row = app.state.stores.permissions.find(staff_id, project).await?.unwrap();
    assert!(!row.capabilities.can_read_personal_info);
    assert!(app.state.stores.permissions.find(guest.id, project).await?.is_none());

    // Flags the inviter holds can still be granted
    let (status, _) = app
        .json(Method::POST, &uri, Some(&staff), Some(json!({ "user_id": guest.id })))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .json(
            Method::PATCH,
            &format!("{}/{}", uri, guest.id),
            Some(&staff),
            Some(json!({ "can_read_documents": true })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn project_creation_provisions_the_creator() -> Result<()> {
    let app = TestApp::new();
    let staff = common::create_user(&app.state, "staff@example.com", Role::Staff).await;
    let token = common::access_token(&app.state, &staff);

    let (status, body) = app
        .json(Method::POST, "/api/projects", Some(&token), Some(json!({ "name": "Border camp" })))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["name"], "Border camp");
    let project: Uuid = serde_json::from_value(body["data"]["id"].clone())?;

    let row = app.state.stores.permissions.find(staff.id, project).await?.unwrap();
    assert_eq!(row.capabilities, Permission::for_role(staff.id, project, Role::Staff).capabilities);

    let (status, body) = app
        .json(Method::GET, &format!("/api/projects/{}", project), Some(&token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["created_by"], staff.id.to_string());

    let guest = common::create_user(&app.state, "guest@example.com", Role::Guest).await;
    let guest_token = common::access_token(&app.state, &guest);
    let (status, _) = app
        .json(Method::POST, "/api/projects", Some(&guest_token), Some(json!({ "name": "Nope" })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .json(Method::GET, &format!("/api/projects/{}", Uuid::new_v4()), Some(&token), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn admins_register_accounts() -> Result<()> {
    let app = TestApp::new();
    let admin = common::create_user(&app.state, "admin@example.com", Role::Admin).await;
    let admin_token = common::access_token(&app.state, &admin);

    let (status, body) = app
        .json(
            Method::POST,
            "/api/users",
            Some(&admin_token),
            Some(json!({ "email": "new@example.com", "password": common::PASSWORD, "role": "consultant" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["role"], "consultant");
    assert!(body["data"].get("password_hash").is_none());
    assert_eq!(app.login("new@example.com", json!({})).await?.0, StatusCode::OK);

    let (status, body) = app
        .json(
            Method::POST,
            "/api/users",
            Some(&admin_token),
            Some(json!({ "email": "weak@example.com", "password": "short", "role": "staff" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "UNPROCESSABLE_ENTITY");

    let (status, _) = app
        .json(
            Method::POST,
            "/api/users",
            Some(&admin_token),
            Some(json!({ "email": "NEW@example.com", "password": common::PASSWORD, "role": "staff" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let staff = common::create_user(&app.state, "staff@example.com", Role::Staff).await;
    let (status, _) = app
        .json(
            Method::POST,
            "/api/users",
            Some(&common::access_token(&app.state, &staff)),
            Some(json!({ "email": "other@example.com", "password": common::PASSWORD, "role": "admin" })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn backup_code_batch_is_swapped_atomically() -> Result<()> {
    let app = TestApp::new();
    let user = common::create_user(&app.state, "mfa@example.com", Role::Staff).await;
    let setup = app.state.auth.mfa().setup(&user.email)?;
    app.state
        .stores
        .users
        .update_mfa(user.id, true, Some(&setup.sealed_secret), Some(&setup.sealed_backup_codes))
        .await?;

    let (status, _) = app
        .login("mfa@example.com", json!({ "backup_code": setup.backup_codes[0] }))
        .await?;
    assert_eq!(status, StatusCode::OK);

    // A login that read the original batch before the first one wrote loses the swap
    let stale = app
        .state
        .stores
        .users
        .replace_backup_codes(user.id, &setup.sealed_backup_codes, &setup.sealed_backup_codes)
        .await?;
    assert!(!stale);
    Ok(())
}
