pub mod openrouter;
pub mod zhipu;
