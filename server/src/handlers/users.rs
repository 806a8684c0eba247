//! Current-user endpoint.

use crate::db::{self, Outcome};
use crate::AppState;
use futures::FutureExt;
use larder_engine::{FilterExpression, Record, SelectRequest, Table};
use serde::Serialize;

/// Public profile of the caller. Email and provider ids are never returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentUser {
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl CurrentUser {
    fn from_record(row: &Record) -> Self {
        Self {
            name: row.get_str("name").map(str::to_string),
            picture: row.get_str("google_picture_url").map(str::to_string),
        }
    }
}

/// Read the caller's own user row. An unknown caller is `EmptyResult`.
pub async fn handle_current_user(state: &AppState, caller: &str) -> Outcome<CurrentUser> {
    let source = match SelectRequest::table(Table::Users)
        .filtered(FilterExpression::new().and_in("google_id", [caller]))
        .source()
    {
        Ok(source) => source,
        Err(e) => return Outcome::failure("current_user", &e.into()),
    };
    let caller = caller.to_string();

    db::run(&state.pool, "current_user", "User retrieved.", |conn| {
        async move {
            let row = db::select_one(conn, &source, &caller).await?;
            Ok(CurrentUser::from_record(&row))
        }
        .boxed()
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_engine::record;
    use serde_json::json;

    #[test]
    fn profile_keeps_name_and_picture_only() {
        let row = record!(
            "google_id": "1234",
            "google_email": "cook@example.com",
            "google_picture_url": "https://example.com/me.png",
            "name": "Cook",
            "locale": null
        );
        let user = CurrentUser::from_record(&row);
        assert_eq!(
            serde_json::to_value(&user).unwrap(),
            json!({"name": "Cook", "picture": "https://example.com/me.png"})
        );
    }

    #[test]
    fn missing_fields_are_null() {
        let user = CurrentUser::from_record(&record!("google_id": "1234", "name": null));
        assert_eq!(
            user,
            CurrentUser {
                name: None,
                picture: None
            }
        );
    }
}
