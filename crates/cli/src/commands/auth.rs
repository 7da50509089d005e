//! Session commands.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use souk_core::Role;
use souk_storefront::Storefront;
use souk_storefront::gateway::{Identity, ProfileImage, ProfileUpdate, Registration};

use super::CliError;

/// Raw `register` arguments.
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub phone: Option<String>,
    pub role: Role,
    pub business_name: Option<String>,
    pub image: Option<PathBuf>,
}

pub async fn login(storefront: &Storefront, email: &str, password: &str) -> Result<(), CliError> {
    let user = storefront.login(email, password).await?;
    tracing::info!("Signed in as {} <{}>", user.name, user.email);
    Ok(())
}

pub async fn register(storefront: &Storefront, form: RegisterForm) -> Result<(), CliError> {
    let profile_image = form.image.as_deref().map(read_image).transpose()?;
    let registration = Registration {
        name: form.name,
        email: form.email,
        phone: form.phone,
        password: SecretString::from(form.password),
        confirm_password: SecretString::from(form.confirm_password),
        role: form.role,
        business_name: form.business_name,
        profile_image,
    };

    let user = storefront.register(&registration).await?;
    tracing::info!("Welcome, {}! Your {} account is ready", user.name, user.role);
    Ok(())
}

pub fn logout(storefront: &Storefront) {
    storefront.logout();
    tracing::info!("Signed out");
}

pub fn whoami(storefront: &Storefront) -> Result<(), CliError> {
    let user = storefront.session().identity().ok_or(CliError::NotSignedIn)?;
    print_identity(&user);
    Ok(())
}

pub async fn update_profile(
    storefront: &Storefront,
    name: Option<String>,
    phone: Option<String>,
    business_name: Option<String>,
    image: Option<PathBuf>,
) -> Result<(), CliError> {
    if !storefront.session().is_authenticated() {
        return Err(CliError::NotSignedIn);
    }
    let update = ProfileUpdate {
        name,
        phone,
        business_name,
        profile_image: image.as_deref().map(read_image).transpose()?,
    };

    let user = storefront.update_profile(&update).await?;
    tracing::info!("Profile updated");
    print_identity(&user);
    Ok(())
}

fn print_identity(user: &Identity) {
    tracing::info!("{} <{}>", user.name, user.email);
    tracing::info!("  Id:   {}", user.id);
    tracing::info!("  Role: {}", user.role);
    if let Some(phone) = &user.phone {
        tracing::info!("  Phone: {phone}");
    }
    if let Some(business) = &user.business_name {
        tracing::info!("  Business: {business}");
    }
}

/// Load an image from disk, deriving its MIME type from the extension.
fn read_image(path: &Path) -> Result<ProfileImage, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file_name = path
        .file_name()
        .map_or_else(|| "profile".to_string(), |name| name.to_string_lossy().into_owned());

    Ok(ProfileImage::new(file_name, mime_for(path), bytes)?)
}

fn mime_for(path: &Path) -> String {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(mime_for(Path::new("me.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("/tmp/me.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("notes.txt")), "application/octet-stream");
        assert_eq!(mime_for(Path::new("no_extension")), "application/octet-stream");
    }

    #[test]
    fn test_missing_image_file() {
        let err = read_image(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }
}
