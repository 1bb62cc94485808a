mod assembly;
mod solve;
