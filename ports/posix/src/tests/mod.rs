mod budget;
mod ring;
