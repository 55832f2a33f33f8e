mod new_user;

#[cfg(test)]
mod tests;

pub use new_user::*;
