pub mod scene_models;
