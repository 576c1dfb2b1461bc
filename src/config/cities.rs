/// Cities a listing can be registered in, in the order the city picker shows them.
pub const MOROCCAN_CITIES: &[&str] = &[
    "Agadir",
    "Al Hoceima",
    "Beni Mellal",
    "Berrechid",
    "Casablanca",
    "Dakhla",
    "El Jadida",
    "Errachidia",
    "Essaouira",
    "Fes",
    "Guelmim",
    "Ifrane",
    "Kenitra",
    "Khemisset",
    "Khouribga",
    "Laayoune",
    "Larache",
    "Marrakech",
    "Meknes",
    "Mohammedia",
    "Nador",
    "Ouarzazate",
    "Oujda",
    "Rabat",
    "Safi",
    "Sale",
    "Settat",
    "Tangier",
    "Taroudant",
    "Taza",
    "Temara",
    "Tetouan",
];

pub fn is_known_city(city: &str) -> bool {
    MOROCCAN_CITIES.contains(&city)
}
