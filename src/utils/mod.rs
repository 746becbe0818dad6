use once_cell::sync::OnceCell;
use std::env;

pub mod checkout_cookie;

static INIT_DOTENV: OnceCell<()> = OnceCell::new();

/// Ensures that the dotenv file is loaded into the environment variables.
///
/// The file is the first command line argument, `.env` when none is given.
/// Loading happens once per process; later calls only return the path.
pub fn ensure_dotenv_loaded() -> String {
    let dotenv_path = env::args().nth(1).unwrap_or_else(|| ".env".to_string());
    INIT_DOTENV.get_or_init(|| {
        dotenv::from_filename(&dotenv_path).ok();
    });
    dotenv_path
}
