//! Grouped helpers over the API's fixed path templates.
//!
//! Each helper only builds a [`RequestSpec`] and hands it to
//! [`HttpPipeline::send`]; queueing, caching, retries and session handling
//! apply as for any other request.

use std::fmt::Display;

use serde_json::{json, Value};

use crate::{ApiResponse, FilePart, HttpPipeline, PipelineError, RequestSpec, Result, Transport};

impl<T: Transport> HttpPipeline<T> {
    pub fn auth(&self) -> AuthApi<'_, T> {
        AuthApi { pipeline: self }
    }

    pub fn users(&self) -> UsersApi<'_, T> {
        UsersApi { pipeline: self }
    }

    pub fn tasks(&self) -> TasksApi<'_, T> {
        TasksApi { pipeline: self }
    }

    pub fn disputes(&self) -> DisputesApi<'_, T> {
        DisputesApi { pipeline: self }
    }

    pub fn merchants(&self) -> MerchantsApi<'_, T> {
        MerchantsApi { pipeline: self }
    }

    pub fn analytics(&self) -> AnalyticsApi<'_, T> {
        AnalyticsApi { pipeline: self }
    }

    pub fn content(&self) -> ContentApi<'_, T> {
        ContentApi { pipeline: self }
    }

    pub fn forms(&self) -> FormsApi<'_, T> {
        FormsApi { pipeline: self }
    }

    pub fn uploads(&self) -> UploadsApi<'_, T> {
        UploadsApi { pipeline: self }
    }

    pub fn health(&self) -> HealthApi<'_, T> {
        HealthApi { pipeline: self }
    }

    pub fn security(&self) -> SecurityApi<'_, T> {
        SecurityApi { pipeline: self }
    }
}

/// `/auth/*`. These calls skip the request queue.
#[derive(Debug)]
pub struct AuthApi<'a, T> {
    pipeline: &'a HttpPipeline<T>,
}

impl<T: Transport> AuthApi<'_, T> {
    /// Signs in and stores the returned token. Responses cached for the
    /// previous identity are dropped.
    pub async fn login(&self, email: &str, password: &str) -> Result<ApiResponse> {
        let response = self
            .pipeline
            .send(RequestSpec::post("/auth/login").json(json!({
                "email": email,
                "password": password,
            })))
            .await?;
        let token = extract_token(&response.data)
            .ok_or_else(|| PipelineError::Decode("login response carried no token".to_owned()))?;
        self.pipeline.session().login(&token);
        Ok(response)
    }

    pub async fn register(&self, registration: Value) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::post("/auth/register").json(registration))
            .await
    }

    pub async fn me(&self) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::get("/auth/me")).await
    }

    /// Ends the session locally even when the server call fails.
    pub async fn logout(&self) -> Result<ApiResponse> {
        let outcome = self
            .pipeline
            .send(RequestSpec::post("/auth/logout").retry(0))
            .await;
        self.pipeline.session().logout();
        outcome
    }

    pub async fn forgot_password(&self, email: &str) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::post("/auth/forgot-password").json(json!({ "email": email })))
            .await
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::post("/auth/reset-password").json(json!({
                "token": token,
                "password": password,
            })))
            .await
    }
}

fn extract_token(data: &Value) -> Option<String> {
    data.get("token")
        .or_else(|| data.get("data").and_then(|inner| inner.get("token")))
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
}

#[derive(Debug)]
pub struct UsersApi<'a, T> {
    pipeline: &'a HttpPipeline<T>,
}

impl<T: Transport> UsersApi<'_, T> {
    pub async fn list(&self, query: Value) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::get("/users").query_object(query))
            .await
    }

    pub async fn get(&self, id: impl Display) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::get(format!("/users/{id}"))).await
    }

    pub async fn update(&self, id: impl Display, changes: Value) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::patch(format!("/users/{id}")).json(changes))
            .await
    }

    pub async fn update_status(&self, id: impl Display, status: &str) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::patch(format!("/users/{id}/status")).json(json!({ "status": status })))
            .await
    }

    pub async fn delete(&self, id: impl Display) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::delete(format!("/users/{id}"))).await
    }
}

#[derive(Debug)]
pub struct TasksApi<'a, T> {
    pipeline: &'a HttpPipeline<T>,
}

impl<T: Transport> TasksApi<'_, T> {
    pub async fn list(&self, query: Value) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::get("/tasks").query_object(query))
            .await
    }

    pub async fn get(&self, id: impl Display) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::get(format!("/tasks/{id}"))).await
    }

    pub async fn create(&self, task: Value) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::post("/tasks").json(task)).await
    }

    pub async fn update(&self, id: impl Display, changes: Value) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::patch(format!("/tasks/{id}")).json(changes))
            .await
    }

    pub async fn update_status(&self, id: impl Display, status: &str) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::patch(format!("/tasks/{id}/status")).json(json!({ "status": status })))
            .await
    }

    pub async fn assign(&self, id: impl Display, assignee_id: impl Display) -> Result<ApiResponse> {
        self.pipeline
            .send(
                RequestSpec::post(format!("/tasks/{id}/assign"))
                    .json(json!({ "assigneeId": assignee_id.to_string() })),
            )
            .await
    }

    pub async fn delete(&self, id: impl Display) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::delete(format!("/tasks/{id}"))).await
    }
}

#[derive(Debug)]
pub struct DisputesApi<'a, T> {
    pipeline: &'a HttpPipeline<T>,
}

impl<T: Transport> DisputesApi<'_, T> {
    pub async fn list(&self, query: Value) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::get("/disputes").query_object(query))
            .await
    }

    pub async fn get(&self, id: impl Display) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::get(format!("/disputes/{id}"))).await
    }

    pub async fn create(&self, dispute: Value) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::post("/disputes").json(dispute)).await
    }

    pub async fn update_status(&self, id: impl Display, status: &str) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::patch(format!("/disputes/{id}/status")).json(json!({ "status": status })))
            .await
    }

    pub async fn add_comment(&self, id: impl Display, comment: &str) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::post(format!("/disputes/{id}/comments")).json(json!({ "comment": comment })))
            .await
    }
}

#[derive(Debug)]
pub struct MerchantsApi<'a, T> {
    pipeline: &'a HttpPipeline<T>,
}

impl<T: Transport> MerchantsApi<'_, T> {
    pub async fn list(&self, query: Value) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::get("/merchants").query_object(query))
            .await
    }

    pub async fn get(&self, id: impl Display) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::get(format!("/merchants/{id}"))).await
    }

    /// The caller's own merchant record; `None` until one exists.
    pub async fn my_merchant(&self) -> Result<Option<Value>> {
        let response = self
            .pipeline
            .send(RequestSpec::get("/merchants/my-merchant").allow_not_found())
            .await?;
        Ok(response.into_found())
    }

    pub async fn create(&self, merchant: Value) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::post("/merchants").json(merchant)).await
    }

    pub async fn update(&self, id: impl Display, changes: Value) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::patch(format!("/merchants/{id}")).json(changes))
            .await
    }

    pub async fn approve(&self, id: impl Display) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::patch(format!("/merchants/{id}/approve")))
            .await
    }

    pub async fn reject(&self, id: impl Display, reason: &str) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::patch(format!("/merchants/{id}/reject")).json(json!({ "reason": reason })))
            .await
    }

    pub async fn suspend(&self, id: impl Display, reason: &str) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::patch(format!("/merchants/{id}/suspend")).json(json!({ "reason": reason })))
            .await
    }
}

#[derive(Debug)]
pub struct AnalyticsApi<'a, T> {
    pipeline: &'a HttpPipeline<T>,
}

impl<T: Transport> AnalyticsApi<'_, T> {
    pub async fn dashboard(&self) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::get("/analytics/dashboard")).await
    }

    pub async fn revenue(&self, query: Value) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::get("/analytics/revenue").query_object(query))
            .await
    }

    pub async fn performance(&self, query: Value) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::get("/analytics/performance").query_object(query))
            .await
    }
}

#[derive(Debug)]
pub struct ContentApi<'a, T> {
    pipeline: &'a HttpPipeline<T>,
}

impl<T: Transport> ContentApi<'_, T> {
    pub async fn list(&self, query: Value) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::get("/content").query_object(query))
            .await
    }

    pub async fn get(&self, id: impl Display) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::get(format!("/content/{id}"))).await
    }

    pub async fn create(&self, entry: Value) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::post("/content").json(entry)).await
    }

    pub async fn update(&self, id: impl Display, changes: Value) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::patch(format!("/content/{id}")).json(changes))
            .await
    }

    pub async fn delete(&self, id: impl Display) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::delete(format!("/content/{id}"))).await
    }
}

#[derive(Debug)]
pub struct FormsApi<'a, T> {
    pipeline: &'a HttpPipeline<T>,
}

impl<T: Transport> FormsApi<'_, T> {
    pub async fn submit(&self, form: Value) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::post("/forms").json(form)).await
    }

    /// The caller's most recent submission; `None` if there is none.
    pub async fn my_latest(&self) -> Result<Option<Value>> {
        let response = self
            .pipeline
            .send(RequestSpec::get("/forms/my-latest").allow_not_found())
            .await?;
        Ok(response.into_found())
    }

    pub async fn list(&self, query: Value) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::get("/forms").query_object(query))
            .await
    }

    pub async fn update_status(&self, id: impl Display, status: &str) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::patch(format!("/forms/{id}/status")).json(json!({ "status": status })))
            .await
    }
}

#[derive(Debug)]
pub struct UploadsApi<'a, T> {
    pipeline: &'a HttpPipeline<T>,
}

impl<T: Transport> UploadsApi<'_, T> {
    /// Multipart upload under the upload timeout.
    pub async fn file(&self, file: FilePart, fields: Vec<(String, String)>) -> Result<ApiResponse> {
        let timeout = self.pipeline.options().upload_timeout;
        self.pipeline
            .send(
                RequestSpec::post("/uploads")
                    .multipart(vec![file], fields)
                    .timeout(timeout),
            )
            .await
    }

    pub async fn delete(&self, id: impl Display) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::delete(format!("/uploads/{id}"))).await
    }
}

#[derive(Debug)]
pub struct HealthApi<'a, T> {
    pipeline: &'a HttpPipeline<T>,
}

impl<T: Transport> HealthApi<'_, T> {
    pub async fn check(&self) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::get("/health")).await
    }
}

#[derive(Debug)]
pub struct SecurityApi<'a, T> {
    pipeline: &'a HttpPipeline<T>,
}

impl<T: Transport> SecurityApi<'_, T> {
    pub async fn audit_logs(&self, query: Value) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::get("/security/audit-logs").query_object(query))
            .await
    }

    pub async fn sessions(&self) -> Result<ApiResponse> {
        self.pipeline.send(RequestSpec::get("/security/sessions")).await
    }

    pub async fn revoke_session(&self, id: impl Display) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::delete(format!("/security/sessions/{id}")))
            .await
    }

    pub async fn change_password(&self, current: &str, new_password: &str) -> Result<ApiResponse> {
        self.pipeline
            .send(RequestSpec::post("/security/change-password").json(json!({
                "currentPassword": current,
                "newPassword": new_password,
            })))
            .await
    }
}
