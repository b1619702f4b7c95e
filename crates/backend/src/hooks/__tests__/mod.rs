mod execution;
mod helpers;
