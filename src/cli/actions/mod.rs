pub mod account;

use crate::cli::globals::GlobalArgs;
use anyhow::Result;

#[derive(Debug)]
pub enum Action {
    SignIn(account::SignInArgs),
    SignUp(account::SignUpArgs),
    WhoAmI(GlobalArgs),
    SignOut(GlobalArgs),
}

impl Action {
    /// Execute the action.
    ///
    /// # Errors
    /// Returns an error if the auth service is unreachable or rejects the request.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::SignIn(args) => account::sign_in(args).await,
            Self::SignUp(args) => account::sign_up(args).await,
            Self::WhoAmI(globals) => account::who_am_i(&globals).await,
            Self::SignOut(globals) => account::sign_out(&globals).await,
        }
    }
}
