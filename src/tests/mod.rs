//! End-to-end scenario tests exercising the coordinator's components
//! wired together the way `Coordinator::new` composes them, rather than in
//! isolation (a dedicated module distinct from the inline
//! `#[cfg(test)]` blocks that already cover each component on its own).

#[cfg(test)]
mod scenarios;
