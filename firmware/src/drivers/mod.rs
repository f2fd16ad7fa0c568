pub mod piezo;
