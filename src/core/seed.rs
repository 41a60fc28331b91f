// Fixed dataset loaded on every start: five books, three users, no loans.
use crate::core::library::Library;

const BOOKS: [(&str, &str, i32); 5] = [
    ("Python para Principiantes", "Juan Pérez", 2020),
    ("Estructuras de Datos", "María García", 2019),
    ("Algoritmos Avanzados", "Carlos López", 2021),
    ("Desarrollo Web", "Ana Martínez", 2022),
    ("Base de Datos", "Luis Rodríguez", 2018),
];

const USERS: [(&str, &str); 3] = [
    ("Ash Ketchum", "ash@pokedev.com"),
    ("Misty Waterflower", "misty@pokedev.com"),
    ("Brock Harrison", "brock@pokedev.com"),
];

pub fn load_seed(library: &mut Library) {
    for (title, author, year) in BOOKS {
        library.add_book(title, author, year);
    }
    for (name, email) in USERS {
        library.add_user(name, email);
    }
}
