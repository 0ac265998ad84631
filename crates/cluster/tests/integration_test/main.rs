mod helpers;
mod registry;
