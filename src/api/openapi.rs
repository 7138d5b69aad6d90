use super::handlers::{account, auth, health};
use utoipa::openapi::{
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Components, Contact, InfoBuilder, License, OpenApiBuilder, Tag,
};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Endpoints registered here via `.routes(routes!(...))` are both served and
/// documented. `OPTIONS /health` and `/openapi.json` are added in `api::new`.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::login::login_2fa))
        .routes(routes!(auth::login::resend_2fa_otp))
        .routes(routes!(auth::session::refresh))
        .routes(routes!(auth::session::logout))
        .routes(routes!(auth::session::me))
        .routes(routes!(account::register::register))
        .routes(routes!(account::register::verify_otp))
        .routes(routes!(account::register::resend_otp))
        .routes(routes!(account::password::forget_password))
        .routes(routes!(account::password::reset_password));

    let openapi = router.get_openapi_mut();
    openapi.tags = Some(vec![
        tag("studentdesk", "Student portal authentication API"),
        tag("auth", "Login, two-factor codes and token refresh"),
        tag("account", "Registration, phone verification and password reset"),
        tag("health", "Liveness and dependency status"),
    ]);
    openapi
        .components
        .get_or_insert_with(Components::new)
        .add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );

    router
}

fn tag(name: &str, description: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.description = Some(description.to_string());
    tag
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, email)) => (
            non_empty(name.trim()),
            non_empty(email.trim_end_matches('>').trim()),
        ),
        None => (non_empty(author.trim()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            doc.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = doc.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Studentdesk"));
            assert_eq!(contact.email.as_deref(), Some("team@studentdesk.dev"));
        }

        let license = doc.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
        }
    }

    #[test]
    fn openapi_tags_and_paths() {
        let doc = openapi();
        let tags = doc.tags.clone().unwrap_or_default();
        for name in ["studentdesk", "auth", "account", "health"] {
            assert!(tags.iter().any(|tag| tag.name == name), "missing tag {name}");
        }

        for path in [
            "/health",
            "/auth/login",
            "/auth/login-2fa",
            "/auth/resend-2fa-otp",
            "/auth/refresh",
            "/auth/logout",
            "/auth/me",
            "/Account/Register",
            "/Account/VerifyOTP",
            "/Account/ResendOTP",
            "/Account/ForgetPassword",
            "/Account/ResetPassword",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing path {path}");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = openapi();
        let components = doc.components.unwrap_or_default();
        assert!(components.security_schemes.contains_key("bearer"));
    }

    #[test]
    fn parse_author_variants() {
        assert_eq!(
            parse_author("Team Studentdesk <team@studentdesk.dev>"),
            (Some("Team Studentdesk"), Some("team@studentdesk.dev"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
        assert_eq!(parse_author("<a@b.test>"), (None, Some("a@b.test")));
    }
}
